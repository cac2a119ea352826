use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{Error, Result};

// Provider error bodies can be large HTML pages; keep log lines bounded.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
	cfg: qmatch_config::EmbeddingProviderConfig,
	client: Client,
}
impl HttpEmbedder {
	pub fn new(cfg: &qmatch_config::EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.build()?;

		Ok(Self { cfg: cfg.clone(), client })
	}

	pub fn provider_id(&self) -> &str {
		&self.cfg.provider_id
	}

	pub fn dimensions(&self) -> u32 {
		self.cfg.dimensions
	}

	/// One request for the whole slice. Callers own chunking and retries.
	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": texts,
			"dimensions": self.cfg.dimensions,
		});
		let res = self.client.post(url).json(&body).send().await.map_err(classify_transport)?;
		let status = res.status();

		if !status.is_success() {
			let text = res.text().await.unwrap_or_default();

			return Err(classify_status(status, &text));
		}

		let json: Value = res.json().await.map_err(|err| Error::InvalidResponse {
			message: format!("Embedding response is not valid JSON: {err}"),
		})?;
		let vectors = parse_embedding_response(json)?;

		if let Some(vector) = vectors.iter().find(|v| v.len() != self.cfg.dimensions as usize) {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding dimension mismatch: expected {}, got {}.",
					self.cfg.dimensions,
					vector.len()
				),
			});
		}

		Ok(vectors)
	}
}

/// Maps a non-success HTTP status to a typed failure.
pub fn classify_status(status: StatusCode, body: &str) -> Error {
	let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

	if status == StatusCode::TOO_MANY_REQUESTS {
		return Error::RateLimited { status: status.as_u16() };
	}
	if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
		return Error::Transient { message: format!("status {}: {message}", status.as_u16()) };
	}

	Error::Rejected { status: status.as_u16(), message }
}

fn classify_transport(err: reqwest::Error) -> Error {
	if err.is_builder() {
		return Error::InvalidConfig { message: err.to_string() };
	}

	// Timeouts, refused connections and dropped bodies are all worth another attempt.
	Error::Transient { message: err.to_string() }
}

pub fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

//! Chunked, retried, deadline-bound batch embedding.
//!
//! A call either yields one vector per input text, in input order, or fails as a whole. Partial
//! results never leave this module.

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{EmbeddingProvider, Error, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingPolicy {
	pub chunk_size: usize,
	pub max_attempts: u32,
	pub backoff_base: Duration,
	pub max_concurrent_chunks: usize,
	pub batch_timeout: Duration,
}
impl EmbeddingPolicy {
	pub fn from_config(cfg: &qmatch_config::Embedding) -> Self {
		Self {
			chunk_size: cfg.chunk_size.max(1) as usize,
			max_attempts: cfg.max_attempts.max(1),
			backoff_base: Duration::from_millis(cfg.backoff_base_ms),
			max_concurrent_chunks: cfg.max_concurrent_chunks.max(1) as usize,
			batch_timeout: Duration::from_millis(cfg.batch_timeout_ms),
		}
	}

	/// Sleep before retry number `retry` (1-based): `base * 2^(retry - 1)`.
	pub fn backoff_for(&self, retry: u32) -> Duration {
		let factor = 1_u32 << retry.saturating_sub(1).min(20);

		self.backoff_base.saturating_mul(factor)
	}
}
impl Default for EmbeddingPolicy {
	fn default() -> Self {
		Self::from_config(&qmatch_config::Embedding::default())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingUsage {
	pub texts: usize,
	pub chars: usize,
	pub chunks: usize,
	pub provider_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddedBatch {
	pub vectors: Vec<Vec<f32>>,
	pub usage: EmbeddingUsage,
	/// Every backoff sleep taken, in the order chunks finished.
	pub backoffs: Vec<Duration>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
	provider: Arc<dyn EmbeddingProvider>,
	policy: EmbeddingPolicy,
}
impl EmbeddingClient {
	pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: EmbeddingPolicy) -> Self {
		Self { provider, policy }
	}

	pub async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddedBatch> {
		if texts.is_empty() {
			return Ok(EmbeddedBatch::default());
		}

		let chunks: Vec<Vec<String>> =
			texts.chunks(self.policy.chunk_size).map(<[String]>::to_vec).collect();
		let chunk_count = chunks.len();
		let calls = Arc::new(AtomicUsize::new(0));
		let outcome =
			tokio::time::timeout(self.policy.batch_timeout, self.run_chunks(chunks, calls.clone()))
				.await;
		let provider_calls = calls.load(Ordering::Relaxed);
		let (vectors, backoffs) = match outcome {
			Ok(Ok(done)) => done,
			Ok(Err(message)) => {
				tracing::error!(provider_calls, error = %message, "Embedding batch failed.");

				return Err(Error::EmbeddingUnavailable { message, provider_calls });
			},
			Err(_) => {
				let message = format!(
					"Embedding batch exceeded its {} ms deadline.",
					self.policy.batch_timeout.as_millis()
				);

				tracing::error!(provider_calls, "Embedding batch exceeded its deadline.");

				return Err(Error::EmbeddingUnavailable { message, provider_calls });
			},
		};
		let usage = EmbeddingUsage {
			texts: texts.len(),
			chars: texts.iter().map(|text| text.chars().count()).sum(),
			chunks: chunk_count,
			provider_calls,
		};

		tracing::info!(
			texts = usage.texts,
			chars = usage.chars,
			chunks = usage.chunks,
			provider_calls = usage.provider_calls,
			"Embedding batch completed."
		);

		Ok(EmbeddedBatch { vectors, usage, backoffs })
	}

	async fn run_chunks(
		&self,
		chunks: Vec<Vec<String>>,
		calls: Arc<AtomicUsize>,
	) -> std::result::Result<(Vec<Vec<f32>>, Vec<Duration>), String> {
		let semaphore = Arc::new(Semaphore::new(self.policy.max_concurrent_chunks));
		let mut slots: Vec<Option<Vec<Vec<f32>>>> = (0..chunks.len()).map(|_| None).collect();
		let mut tasks = JoinSet::new();

		for (index, chunk) in chunks.into_iter().enumerate() {
			let provider = self.provider.clone();
			let policy = self.policy.clone();
			let semaphore = semaphore.clone();
			let calls = calls.clone();

			tasks.spawn(async move {
				let _permit = semaphore
					.acquire_owned()
					.await
					.map_err(|_| "Embedding concurrency limiter closed.".to_string())?;
				let (vectors, backoffs) =
					embed_chunk(provider.as_ref(), &chunk, &policy, &calls).await?;

				Ok::<_, String>((index, vectors, backoffs))
			});
		}

		let mut backoffs = Vec::new();

		while let Some(joined) = tasks.join_next().await {
			let done = match joined {
				Ok(done) => done,
				Err(err) => Err(format!("Embedding chunk task failed: {err}")),
			};

			match done {
				Ok((index, vectors, chunk_backoffs)) => {
					slots[index] = Some(vectors);

					backoffs.extend(chunk_backoffs);
				},
				Err(message) => {
					tasks.abort_all();

					return Err(message);
				},
			}
		}

		let mut vectors = Vec::new();

		for slot in slots {
			let Some(chunk) = slot else {
				return Err("Embedding chunk finished without vectors.".to_string());
			};

			vectors.extend(chunk);
		}

		Ok((vectors, backoffs))
	}
}

async fn embed_chunk(
	provider: &dyn EmbeddingProvider,
	texts: &[String],
	policy: &EmbeddingPolicy,
	calls: &AtomicUsize,
) -> std::result::Result<(Vec<Vec<f32>>, Vec<Duration>), String> {
	let mut backoffs = Vec::new();
	let mut attempt = 1;

	loop {
		calls.fetch_add(1, Ordering::Relaxed);

		let err = match provider.embed(texts).await {
			Ok(vectors) if vectors.len() == texts.len() => return Ok((vectors, backoffs)),
			Ok(vectors) => qmatch_providers::Error::InvalidResponse {
				message: format!(
					"Provider returned {} vectors for {} texts.",
					vectors.len(),
					texts.len()
				),
			},
			Err(err) => err,
		};

		if !err.is_retryable() || attempt >= policy.max_attempts {
			return Err(format!("{err} (attempt {attempt} of {})", policy.max_attempts));
		}

		let delay = policy.backoff_for(attempt);

		tracing::warn!(
			attempt,
			delay_ms = delay.as_millis() as u64,
			error = %err,
			"Embedding chunk failed. Retrying after backoff."
		);
		tokio::time::sleep(delay).await;
		backoffs.push(delay);

		attempt += 1;
	}
}

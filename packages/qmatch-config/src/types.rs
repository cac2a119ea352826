use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

pub const MAX_EMBEDDING_ATTEMPTS: u32 = 16;
pub const DEFAULT_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub embedding: Embedding,
	#[serde(default)]
	pub matching: Matching,
	#[serde(default)]
	pub normalization: Normalization,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// One of "auto", "native", or "in_process".
	#[serde(default = "default_vector_search")]
	pub vector_search: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Batching and retry policy for embedding calls. Provider request timeouts live on
/// [`EmbeddingProviderConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Embedding {
	pub chunk_size: u32,
	pub max_attempts: u32,
	pub backoff_base_ms: u64,
	pub max_concurrent_chunks: u32,
	pub batch_timeout_ms: u64,
}
impl Embedding {
	/// Sum of every backoff sleep a single chunk can take before giving up.
	pub fn worst_case_backoff_ms(&self) -> u64 {
		(0..self.max_attempts.min(MAX_EMBEDDING_ATTEMPTS).saturating_sub(1))
			.map(|retry| self.backoff_base_ms.saturating_mul(1_u64 << retry.min(20)))
			.fold(0_u64, u64::saturating_add)
	}
}
impl Default for Embedding {
	fn default() -> Self {
		Self {
			chunk_size: 2_048,
			max_attempts: 3,
			backoff_base_ms: 2_000,
			max_concurrent_chunks: 4,
			batch_timeout_ms: 90_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Matching {
	pub fuzzy_threshold: f32,
	pub semantic_high_threshold: f32,
	pub semantic_medium_threshold: f32,
	/// When true a semantic score equal to the high threshold links automatically.
	pub high_threshold_inclusive: bool,
	pub fuzzy: FuzzyMatching,
}
impl Default for Matching {
	fn default() -> Self {
		Self {
			fuzzy_threshold: 0.90,
			semantic_high_threshold: 0.92,
			semantic_medium_threshold: 0.80,
			high_threshold_inclusive: false,
			fuzzy: FuzzyMatching::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuzzyMatching {
	/// One of "length_bound" or "none".
	pub prefilter: String,
	/// Normalized questions longer than this skip the fuzzy stage.
	pub max_chars: u32,
}
impl Default for FuzzyMatching {
	fn default() -> Self {
		Self { prefilter: "length_bound".to_string(), max_chars: 512 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Normalization {
	pub punctuation: String,
	pub expand_abbreviations: bool,
	/// Extra abbreviations, keyed by the abbreviation itself.
	pub abbreviations: BTreeMap<String, String>,
}
impl Default for Normalization {
	fn default() -> Self {
		Self {
			punctuation: DEFAULT_PUNCTUATION.to_string(),
			expand_abbreviations: true,
			abbreviations: BTreeMap::new(),
		}
	}
}

fn default_vector_search() -> String {
	"auto".to_string()
}

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, DEFAULT_PUNCTUATION, Embedding, EmbeddingProviderConfig, FuzzyMatching,
	MAX_EMBEDDING_ATTEMPTS, Matching, Normalization, Postgres, Providers, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.storage.vector_search.as_str(), "auto" | "native" | "in_process") {
		return Err(Error::Validation {
			message: "storage.vector_search must be one of auto, native, or in_process."
				.to_string(),
		});
	}

	validate_embedding_provider(&cfg.providers.embedding)?;
	validate_embedding(cfg)?;
	validate_matching(cfg)?;

	if cfg.normalization.punctuation.chars().any(char::is_alphanumeric) {
		return Err(Error::Validation {
			message: "normalization.punctuation must not contain letters or digits.".to_string(),
		});
	}

	for (abbreviation, full_form) in &cfg.normalization.abbreviations {
		if abbreviation.trim().is_empty() || full_form.trim().is_empty() {
			return Err(Error::Validation {
				message: "normalization.abbreviations entries must be non-empty.".to_string(),
			});
		}
	}

	Ok(())
}

fn validate_embedding_provider(provider: &EmbeddingProviderConfig) -> Result<()> {
	for (label, value) in [
		("providers.embedding.provider_id", &provider.provider_id),
		("providers.embedding.api_base", &provider.api_base),
		("providers.embedding.api_key", &provider.api_key),
		("providers.embedding.model", &provider.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if provider.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if provider.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_embedding(cfg: &Config) -> Result<()> {
	let embedding = &cfg.embedding;

	for (label, value) in [
		("embedding.chunk_size", embedding.chunk_size),
		("embedding.max_attempts", embedding.max_attempts),
		("embedding.max_concurrent_chunks", embedding.max_concurrent_chunks),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if embedding.max_attempts > MAX_EMBEDDING_ATTEMPTS {
		return Err(Error::Validation {
			message: format!("embedding.max_attempts must be at most {MAX_EMBEDDING_ATTEMPTS}."),
		});
	}

	// One full provider timeout per attempt plus every backoff sleep must fit in the deadline.
	let attempt_budget =
		cfg.providers.embedding.timeout_ms.saturating_mul(u64::from(embedding.max_attempts));
	let budget = attempt_budget.saturating_add(embedding.worst_case_backoff_ms());

	if embedding.batch_timeout_ms < budget {
		return Err(Error::Validation {
			message: format!(
				"embedding.batch_timeout_ms must be at least {budget} to cover retries and backoff."
			),
		});
	}

	Ok(())
}

fn validate_matching(cfg: &Config) -> Result<()> {
	let matching = &cfg.matching;

	for (label, value) in [
		("matching.fuzzy_threshold", matching.fuzzy_threshold),
		("matching.semantic_high_threshold", matching.semantic_high_threshold),
		("matching.semantic_medium_threshold", matching.semantic_medium_threshold),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if matching.semantic_medium_threshold > matching.semantic_high_threshold {
		return Err(Error::Validation {
			message: "matching.semantic_medium_threshold must not exceed matching.semantic_high_threshold."
				.to_string(),
		});
	}
	if !matches!(matching.fuzzy.prefilter.as_str(), "length_bound" | "none") {
		return Err(Error::Validation {
			message: "matching.fuzzy.prefilter must be one of length_bound or none.".to_string(),
		});
	}
	if matching.fuzzy.max_chars == 0 {
		return Err(Error::Validation {
			message: "matching.fuzzy.max_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.vector_search = cfg.storage.vector_search.trim().to_ascii_lowercase();
	cfg.matching.fuzzy.prefilter = cfg.matching.fuzzy.prefilter.trim().to_ascii_lowercase();

	while cfg.providers.embedding.api_base.ends_with('/') {
		cfg.providers.embedding.api_base.pop();
	}

	cfg.normalization.abbreviations = std::mem::take(&mut cfg.normalization.abbreviations)
		.into_iter()
		.map(|(abbreviation, full_form)| {
			(abbreviation.trim().to_string(), full_form.trim().to_string())
		})
		.collect();
}

use std::{cmp::Ordering, sync::Arc};

use qmatch_domain::vector;
use qmatch_storage::models::CanonicalEntry;

use crate::{BoxFuture, Error, Repository, Result};

#[derive(Debug, Clone)]
pub struct ScoredCanonical {
	pub entry: CanonicalEntry,
	/// Cosine similarity in `[-1, 1]`.
	pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStrategy {
	Native,
	InProcess,
}
impl VectorStrategy {
	/// Resolves `storage.vector_search` against the detected storage capability.
	pub fn select(setting: &str, native_available: bool) -> Result<Self> {
		match setting {
			"auto" if native_available => Ok(Self::Native),
			"auto" => Ok(Self::InProcess),
			"native" if native_available => Ok(Self::Native),
			"native" => Err(Error::Config {
				message: "storage.vector_search is native but the storage has no vector support."
					.to_string(),
			}),
			"in_process" => Ok(Self::InProcess),
			other => Err(Error::Config {
				message: format!("Unknown storage.vector_search value {other:?}."),
			}),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Native => "native",
			Self::InProcess => "in_process",
		}
	}
}

/// Top-k nearest canonical entries of a tenant for a query vector.
///
/// Results are ordered by descending score with ties in insertion order. Entries without an
/// embedding never appear, and an empty tenant yields an empty list.
pub trait SimilaritySearcher
where
	Self: Send + Sync,
{
	fn strategy(&self) -> VectorStrategy;

	fn search<'a>(
		&'a self,
		tenant_id: &'a str,
		query: &'a [f32],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredCanonical>>>;

	fn search_many<'a>(
		&'a self,
		tenant_id: &'a str,
		queries: &'a [Vec<f32>],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<Vec<ScoredCanonical>>>> {
		Box::pin(async move {
			let mut out = Vec::with_capacity(queries.len());

			for query in queries {
				out.push(self.search(tenant_id, query, top_k).await?);
			}

			Ok(out)
		})
	}
}

pub struct NativeSearcher {
	repo: Arc<dyn Repository>,
}
impl NativeSearcher {
	pub fn new(repo: Arc<dyn Repository>) -> Self {
		Self { repo }
	}
}
impl SimilaritySearcher for NativeSearcher {
	fn strategy(&self) -> VectorStrategy {
		VectorStrategy::Native
	}

	fn search<'a>(
		&'a self,
		tenant_id: &'a str,
		query: &'a [f32],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredCanonical>>> {
		Box::pin(async move {
			if top_k == 0 {
				return Ok(Vec::new());
			}

			self.repo.nearest_canonical(tenant_id, query, top_k).await
		})
	}
}

pub struct InProcessSearcher {
	repo: Arc<dyn Repository>,
}
impl InProcessSearcher {
	pub fn new(repo: Arc<dyn Repository>) -> Self {
		Self { repo }
	}
}
impl SimilaritySearcher for InProcessSearcher {
	fn strategy(&self) -> VectorStrategy {
		VectorStrategy::InProcess
	}

	fn search<'a>(
		&'a self,
		tenant_id: &'a str,
		query: &'a [f32],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredCanonical>>> {
		Box::pin(async move {
			let entries = self.repo.list_canonical(tenant_id).await?;

			Ok(rank(&entries, query, top_k))
		})
	}

	// One snapshot load serves every query of the batch.
	fn search_many<'a>(
		&'a self,
		tenant_id: &'a str,
		queries: &'a [Vec<f32>],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<Vec<ScoredCanonical>>>> {
		Box::pin(async move {
			if queries.is_empty() {
				return Ok(Vec::new());
			}

			let entries = self.repo.list_canonical(tenant_id).await?;

			Ok(queries.iter().map(|query| rank(&entries, query, top_k)).collect())
		})
	}
}

/// Picks the searcher for `setting` and logs the choice.
pub fn build_searcher(
	repo: Arc<dyn Repository>,
	setting: &str,
) -> Result<Arc<dyn SimilaritySearcher>> {
	let strategy = VectorStrategy::select(setting, repo.supports_native_vector())?;

	tracing::info!(
		strategy = strategy.as_str(),
		native_available = repo.supports_native_vector(),
		"Vector search strategy selected."
	);

	let searcher: Arc<dyn SimilaritySearcher> = match strategy {
		VectorStrategy::Native => Arc::new(NativeSearcher::new(repo)),
		VectorStrategy::InProcess => Arc::new(InProcessSearcher::new(repo)),
	};

	Ok(searcher)
}

/// Cosine ranking over `entries`, which must be in insertion order.
pub fn rank(entries: &[CanonicalEntry], query: &[f32], top_k: usize) -> Vec<ScoredCanonical> {
	if query.is_empty() || top_k == 0 {
		return Vec::new();
	}

	let mut scored: Vec<(usize, f32)> = entries
		.iter()
		.enumerate()
		.filter_map(|(index, entry)| {
			let embedding = entry.embedding.as_deref()?;

			if embedding.len() != query.len() {
				return None;
			}

			Some((index, vector::cosine_similarity(query, embedding)))
		})
		.collect();

	// Stable, so equal scores keep insertion order.
	scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
	scored.truncate(top_k);

	scored
		.into_iter()
		.map(|(index, score)| ScoredCanonical { entry: entries[index].clone(), score })
		.collect()
}

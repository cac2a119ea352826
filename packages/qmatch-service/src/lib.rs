pub mod audit;
pub mod embedding;
pub mod ingest;
pub mod matching;
pub mod memory;
pub mod repository;
pub mod search;

mod error;

pub use audit::MatchAuditLog;
pub use embedding::{EmbeddedBatch, EmbeddingClient, EmbeddingPolicy, EmbeddingUsage};
pub use error::{Error, Result};
pub use ingest::{CanonicalInput, IngestReport, LibraryIngestor};
pub use matching::{
	CanonicalRef, IncomingQuestion, MatchBatch, MatchError, MatchOrchestrator, MatchResult,
	MatchSettings,
};
pub use memory::MemoryRepository;
pub use repository::PgRepository;
pub use search::{
	InProcessSearcher, NativeSearcher, ScoredCanonical, SimilaritySearcher, VectorStrategy,
};

use std::{future::Future, pin::Pin};

use uuid::Uuid;

use qmatch_providers::embedding::HttpEmbedder;
use qmatch_storage::models::{CanonicalEntry, CanonicalUpsert, MatchAudit};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	/// One provider request for `texts`, vectors in input order.
	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, qmatch_providers::Result<Vec<Vec<f32>>>>;
}

/// Storage seam for the matching engine. Lookups return `None` rather than "not found" errors.
pub trait Repository
where
	Self: Send + Sync,
{
	/// Whether [`Repository::nearest_canonical`] is backed by a native vector index.
	fn supports_native_vector(&self) -> bool;

	/// Canonical entry a shortcut link for `incoming_id` points at.
	fn find_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>>;

	fn find_by_external_id<'a>(
		&'a self,
		tenant_id: &'a str,
		external_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>>;

	/// Every canonical entry of the tenant, in insertion order.
	fn list_canonical<'a>(&'a self, tenant_id: &'a str)
	-> BoxFuture<'a, Result<Vec<CanonicalEntry>>>;

	fn upsert_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
		canonical_id: Uuid,
	) -> BoxFuture<'a, Result<()>>;

	fn append_audit<'a>(&'a self, records: &'a [MatchAudit]) -> BoxFuture<'a, Result<()>>;

	fn nearest_canonical<'a>(
		&'a self,
		tenant_id: &'a str,
		query: &'a [f32],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredCanonical>>>;

	/// Returns the stored canonical id and whether the entry was newly created.
	fn upsert_canonical<'a>(
		&'a self,
		entry: &'a CanonicalUpsert,
	) -> BoxFuture<'a, Result<(Uuid, bool)>>;

	fn list_missing_embeddings<'a>(
		&'a self,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CanonicalEntry>>>;
}

impl EmbeddingProvider for HttpEmbedder {
	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, qmatch_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(HttpEmbedder::embed(self, texts))
	}
}

/// BLAKE3 hex digest of the text that was embedded.
pub fn text_hash(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}

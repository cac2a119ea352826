use time::OffsetDateTime;
use uuid::Uuid;

use qmatch_storage::{
	db::Db,
	models::{CanonicalEntry, CanonicalUpsert, MatchAudit},
	queries,
};

use crate::{BoxFuture, Repository, Result, ScoredCanonical};

/// Postgres-backed [`Repository`].
pub struct PgRepository {
	db: Db,
	native_vector: bool,
}
impl PgRepository {
	/// `native_vector` is the result of [`Db::detect_vector_support`].
	pub fn new(db: Db, native_vector: bool) -> Self {
		Self { db, native_vector }
	}

	/// Bootstraps the schema and probes for vector support.
	pub async fn bootstrap(db: Db) -> Result<Self> {
		db.ensure_schema().await?;

		let native_vector = db.detect_vector_support().await?;

		tracing::info!(native_vector, "Postgres repository ready.");

		Ok(Self::new(db, native_vector))
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	pub async fn list_audit(&self, tenant_id: &str) -> Result<Vec<MatchAudit>> {
		Ok(queries::list_audit(&self.db.pool, tenant_id).await?)
	}
}

impl Repository for PgRepository {
	fn supports_native_vector(&self) -> bool {
		self.native_vector
	}

	fn find_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>> {
		Box::pin(async move {
			let Some(link) = queries::find_link(&self.db.pool, tenant_id, incoming_id).await? else {
				return Ok(None);
			};

			Ok(queries::get_canonical(&self.db.pool, tenant_id, link.canonical_id).await?)
		})
	}

	fn find_by_external_id<'a>(
		&'a self,
		tenant_id: &'a str,
		external_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>> {
		Box::pin(async move {
			Ok(queries::find_canonical_by_external_id(&self.db.pool, tenant_id, external_id).await?)
		})
	}

	fn list_canonical<'a>(
		&'a self,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CanonicalEntry>>> {
		Box::pin(async move { Ok(queries::list_canonical(&self.db.pool, tenant_id).await?) })
	}

	fn upsert_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
		canonical_id: Uuid,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			queries::upsert_link(&self.db.pool, tenant_id, incoming_id, canonical_id, now).await?;

			Ok(())
		})
	}

	fn append_audit<'a>(&'a self, records: &'a [MatchAudit]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;

			for record in records {
				queries::insert_audit(&mut *tx, record).await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn nearest_canonical<'a>(
		&'a self,
		tenant_id: &'a str,
		query: &'a [f32],
		top_k: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredCanonical>>> {
		Box::pin(async move {
			let top_k = u32::try_from(top_k).unwrap_or(u32::MAX);
			let rows = queries::nearest_canonical(&self.db.pool, tenant_id, query, top_k).await?;

			Ok(rows
				.into_iter()
				.map(|row| ScoredCanonical { entry: row.entry, score: row.similarity as f32 })
				.collect())
		})
	}

	fn upsert_canonical<'a>(
		&'a self,
		entry: &'a CanonicalUpsert,
	) -> BoxFuture<'a, Result<(Uuid, bool)>> {
		Box::pin(async move { Ok(queries::upsert_canonical(&self.db.pool, entry).await?) })
	}

	fn list_missing_embeddings<'a>(
		&'a self,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CanonicalEntry>>> {
		Box::pin(
			async move { Ok(queries::list_missing_embeddings(&self.db.pool, tenant_id).await?) },
		)
	}
}

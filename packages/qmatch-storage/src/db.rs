use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Result, schema};

const SCHEMA_LOCK_ID: i64 = 7_120_115;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &qmatch_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Whether the `vector` extension is usable for nearest-neighbor queries.
	///
	/// Tries to install the extension first. Lacking the privilege or the package is not an error:
	/// the answer is simply `false`.
	pub async fn detect_vector_support(&self) -> Result<bool> {
		let created =
			sqlx::query("CREATE EXTENSION IF NOT EXISTS vector").execute(&self.pool).await;

		if let Err(err) = created {
			tracing::info!(error = %err, "Vector extension could not be created.");
		}

		let installed: bool = sqlx::query_scalar(
			"SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')",
		)
		.fetch_one(&self.pool)
		.await?;

		Ok(installed)
	}
}

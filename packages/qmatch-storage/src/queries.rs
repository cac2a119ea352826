use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{CanonicalEntry, CanonicalUpsert, MatchAudit, ScoredCanonicalEntry, ShortcutLink},
};

const CANONICAL_COLUMNS: &str = "\
canonical_id,
	seq,
	tenant_id,
	external_id,
	question_text,
	answer,
	evidence,
	embedding,
	text_hash,
	created_at,
	updated_at";

pub async fn find_link<'e, E>(
	executor: E,
	tenant_id: &str,
	incoming_id: &str,
) -> Result<Option<ShortcutLink>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ShortcutLink>(
		"\
SELECT tenant_id, incoming_id, canonical_id, created_at, updated_at
FROM shortcut_links
WHERE tenant_id = $1 AND incoming_id = $2",
	)
	.bind(tenant_id)
	.bind(incoming_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn upsert_link<'e, E>(
	executor: E,
	tenant_id: &str,
	incoming_id: &str,
	canonical_id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO shortcut_links (tenant_id, incoming_id, canonical_id, created_at, updated_at)
VALUES ($1, $2, $3, $4, $4)
ON CONFLICT (tenant_id, incoming_id) DO UPDATE
SET
	canonical_id = EXCLUDED.canonical_id,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(tenant_id)
	.bind(incoming_id)
	.bind(canonical_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_canonical<'e, E>(
	executor: E,
	tenant_id: &str,
	canonical_id: Uuid,
) -> Result<Option<CanonicalEntry>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {CANONICAL_COLUMNS}\nFROM canonical_entries\nWHERE tenant_id = $1 AND canonical_id = $2"
	);
	let row = sqlx::query_as::<_, CanonicalEntry>(&sql)
		.bind(tenant_id)
		.bind(canonical_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn find_canonical_by_external_id<'e, E>(
	executor: E,
	tenant_id: &str,
	external_id: &str,
) -> Result<Option<CanonicalEntry>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {CANONICAL_COLUMNS}\nFROM canonical_entries\nWHERE tenant_id = $1 AND external_id = $2"
	);
	let row = sqlx::query_as::<_, CanonicalEntry>(&sql)
		.bind(tenant_id)
		.bind(external_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Every entry of the tenant in insertion order.
pub async fn list_canonical<'e, E>(executor: E, tenant_id: &str) -> Result<Vec<CanonicalEntry>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {CANONICAL_COLUMNS}\nFROM canonical_entries\nWHERE tenant_id = $1\nORDER BY seq ASC"
	);
	let rows =
		sqlx::query_as::<_, CanonicalEntry>(&sql).bind(tenant_id).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn list_missing_embeddings<'e, E>(
	executor: E,
	tenant_id: &str,
) -> Result<Vec<CanonicalEntry>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {CANONICAL_COLUMNS}\nFROM canonical_entries\nWHERE tenant_id = $1 AND embedding IS NULL\nORDER BY seq ASC"
	);
	let rows =
		sqlx::query_as::<_, CanonicalEntry>(&sql).bind(tenant_id).fetch_all(executor).await?;

	Ok(rows)
}

/// Nearest embedded entries by cosine distance. Requires the `vector` extension.
///
/// Entries whose stored dimension differs from the query are skipped rather than failing the
/// whole statement. A zero-norm vector on either side scores `0` instead of `NaN`.
pub async fn nearest_canonical<'e, E>(
	executor: E,
	tenant_id: &str,
	query: &[f32],
	top_k: u32,
) -> Result<Vec<ScoredCanonicalEntry>>
where
	E: PgExecutor<'e>,
{
	if query.is_empty() {
		return Err(Error::InvalidArgument("Query vector must be non-empty.".to_string()));
	}

	let sql = format!(
		"\
SELECT
	{CANONICAL_COLUMNS},
	COALESCE(
		NULLIF((1 - (embedding::vector <=> $2::real[]::vector))::float8, 'NaN'::float8),
		0
	) AS similarity
FROM canonical_entries
WHERE tenant_id = $1
	AND embedding IS NOT NULL
	AND cardinality(embedding) = cardinality($2::real[])
ORDER BY similarity DESC, seq ASC
LIMIT $3"
	);
	let rows = sqlx::query_as::<_, ScoredCanonicalEntry>(&sql)
		.bind(tenant_id)
		.bind(query)
		.bind(i64::from(top_k))
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Inserts or updates by `(tenant_id, external_id)`. Returns the stored id and whether the row was
/// newly inserted.
pub async fn upsert_canonical<'e, E>(executor: E, entry: &CanonicalUpsert) -> Result<(Uuid, bool)>
where
	E: PgExecutor<'e>,
{
	let row: (Uuid, bool) = sqlx::query_as(
		"\
INSERT INTO canonical_entries (
	canonical_id,
	tenant_id,
	external_id,
	question_text,
	answer,
	evidence,
	embedding,
	text_hash,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
ON CONFLICT (tenant_id, external_id) DO UPDATE
SET
	question_text = EXCLUDED.question_text,
	answer = EXCLUDED.answer,
	evidence = EXCLUDED.evidence,
	embedding = EXCLUDED.embedding,
	text_hash = EXCLUDED.text_hash,
	updated_at = EXCLUDED.updated_at
RETURNING canonical_id, (xmax = 0) AS inserted",
	)
	.bind(entry.canonical_id)
	.bind(entry.tenant_id.as_str())
	.bind(entry.external_id.as_str())
	.bind(entry.question_text.as_str())
	.bind(&entry.answer)
	.bind(entry.evidence.as_deref())
	.bind(entry.embedding.as_deref())
	.bind(entry.text_hash.as_deref())
	.bind(entry.now)
	.fetch_one(executor)
	.await?;

	Ok(row)
}

pub async fn insert_audit<'e, E>(executor: E, audit: &MatchAudit) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO match_audit (
	audit_id,
	tenant_id,
	incoming_id,
	method,
	score,
	outcome,
	canonical_id,
	error_code,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(audit.audit_id)
	.bind(audit.tenant_id.as_str())
	.bind(audit.incoming_id.as_str())
	.bind(audit.method.as_str())
	.bind(audit.score)
	.bind(audit.outcome.as_str())
	.bind(audit.canonical_id)
	.bind(audit.error_code.as_deref())
	.bind(audit.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_audit<'e, E>(executor: E, tenant_id: &str) -> Result<Vec<MatchAudit>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MatchAudit>(
		"\
SELECT
	audit_id,
	tenant_id,
	incoming_id,
	method,
	score,
	outcome,
	canonical_id,
	error_code,
	created_at
FROM match_audit
WHERE tenant_id = $1
ORDER BY created_at ASC, audit_id ASC",
	)
	.bind(tenant_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

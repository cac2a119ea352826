use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CanonicalEntry {
	pub canonical_id: Uuid,
	pub seq: i64,
	pub tenant_id: String,
	pub external_id: String,
	pub question_text: String,
	pub answer: Value,
	pub evidence: Option<String>,
	pub embedding: Option<Vec<f32>>,
	pub text_hash: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredCanonicalEntry {
	#[sqlx(flatten)]
	pub entry: CanonicalEntry,
	pub similarity: f64,
}

/// Write model for a canonical upsert; `seq` and timestamps are assigned by the database row.
#[derive(Debug, Clone)]
pub struct CanonicalUpsert {
	pub canonical_id: Uuid,
	pub tenant_id: String,
	pub external_id: String,
	pub question_text: String,
	pub answer: Value,
	pub evidence: Option<String>,
	pub embedding: Option<Vec<f32>>,
	pub text_hash: Option<String>,
	pub now: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShortcutLink {
	pub tenant_id: String,
	pub incoming_id: String,
	pub canonical_id: Uuid,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchAudit {
	pub audit_id: Uuid,
	pub tenant_id: String,
	pub incoming_id: String,
	pub method: String,
	pub score: Option<f32>,
	pub outcome: String,
	pub canonical_id: Option<Uuid>,
	pub error_code: Option<String>,
	pub created_at: OffsetDateTime,
}

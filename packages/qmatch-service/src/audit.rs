use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use qmatch_storage::models::MatchAudit;

use crate::{MatchResult, Repository};

/// Append-only sink for match decisions. Never consulted when deciding.
#[derive(Clone)]
pub struct MatchAuditLog {
	repo: Arc<dyn Repository>,
}
impl MatchAuditLog {
	pub fn new(repo: Arc<dyn Repository>) -> Self {
		Self { repo }
	}

	/// Appends one record per result. Failures are logged and swallowed.
	pub async fn record(&self, tenant_id: &str, results: &[MatchResult]) -> bool {
		if results.is_empty() {
			return true;
		}

		let now = OffsetDateTime::now_utc();
		let records: Vec<MatchAudit> =
			results.iter().map(|result| audit_record(tenant_id, result, now)).collect();

		match self.repo.append_audit(&records).await {
			Ok(()) => true,
			Err(err) => {
				tracing::error!(
					tenant_id,
					records = records.len(),
					error = %err,
					"Match audit append failed."
				);

				false
			},
		}
	}
}

pub fn audit_record(tenant_id: &str, result: &MatchResult, now: OffsetDateTime) -> MatchAudit {
	MatchAudit {
		audit_id: Uuid::new_v4(),
		tenant_id: tenant_id.to_string(),
		incoming_id: result.incoming_id.clone(),
		method: result.method.as_str().to_string(),
		score: result.score,
		outcome: result.outcome.as_str().to_string(),
		canonical_id: result.canonical.as_ref().map(|canonical| canonical.canonical_id),
		error_code: result.error.as_ref().map(|err| err.code().to_string()),
		created_at: now,
	}
}

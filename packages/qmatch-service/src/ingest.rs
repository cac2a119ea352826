use std::sync::Arc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use qmatch_domain::abbreviation::AbbreviationExpander;
use qmatch_storage::models::{CanonicalEntry, CanonicalUpsert};

use crate::{EmbeddingClient, EmbeddingUsage, Error, Repository, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalInput {
	pub external_id: String,
	pub question_text: String,
	/// Opaque to the engine, typically `{ "type", "text", "comment" }`.
	pub answer: Value,
	#[serde(default)]
	pub evidence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
	pub created: usize,
	pub updated: usize,
	pub unchanged: usize,
	pub embedded: usize,
	pub usage: EmbeddingUsage,
}

// One planned write. `upsert.embedding` stays `None` until the batch call fills it in.
struct Planned {
	upsert: CanonicalUpsert,
	embed_text: Option<String>,
}

/// Loads and refreshes a tenant's canonical library.
#[derive(Clone)]
pub struct LibraryIngestor {
	repo: Arc<dyn Repository>,
	embedding: EmbeddingClient,
	expander: AbbreviationExpander,
}
impl LibraryIngestor {
	pub fn new(
		repo: Arc<dyn Repository>,
		embedding: EmbeddingClient,
		expander: AbbreviationExpander,
	) -> Self {
		Self { repo, embedding, expander }
	}

	/// Upserts `entries` by external id.
	///
	/// Entries whose embedded text hashes to the stored value keep their vector. Everything else
	/// is embedded in one batch call before any row is written, so an embedding failure writes
	/// nothing.
	pub async fn ingest_canonical(
		&self,
		tenant_id: &str,
		entries: &[CanonicalInput],
	) -> Result<IngestReport> {
		validate_batch(tenant_id, entries)?;

		let now = OffsetDateTime::now_utc();
		let mut report = IngestReport::default();
		let mut planned = Vec::with_capacity(entries.len());

		for input in entries {
			let question_text = input.question_text.trim().to_string();
			let embed_text = self.expander.expand(&question_text);
			let hash = crate::text_hash(&embed_text);
			let external_id = input.external_id.trim();
			let existing = self.repo.find_by_external_id(tenant_id, external_id).await?;
			let reusable = existing.as_ref().and_then(|stored| {
				(stored.text_hash.as_deref() == Some(hash.as_str()))
					.then(|| stored.embedding.clone())
					.flatten()
			});
			let unchanged = existing.as_ref().is_some_and(|stored| {
				reusable.is_some() && is_unchanged(stored, &question_text, input)
			});

			if unchanged {
				report.unchanged += 1;

				continue;
			}

			let canonical_id =
				existing.as_ref().map(|stored| stored.canonical_id).unwrap_or_else(Uuid::new_v4);
			let upsert = CanonicalUpsert {
				canonical_id,
				tenant_id: tenant_id.to_string(),
				external_id: external_id.to_string(),
				question_text,
				answer: input.answer.clone(),
				evidence: input.evidence.clone(),
				embedding: reusable.clone(),
				text_hash: Some(hash),
				now,
			};
			let embed_text = reusable.is_none().then_some(embed_text);

			planned.push(Planned { upsert, embed_text });
		}

		report.usage = self.embed_planned(&mut planned).await?;
		report.embedded = planned.iter().filter(|p| p.embed_text.is_some()).count();

		for p in &planned {
			let (_, created) = self.repo.upsert_canonical(&p.upsert).await?;

			if created {
				report.created += 1;
			} else {
				report.updated += 1;
			}
		}

		tracing::info!(
			tenant_id,
			created = report.created,
			updated = report.updated,
			unchanged = report.unchanged,
			embedded = report.embedded,
			"Canonical ingestion completed."
		);

		Ok(report)
	}

	/// Embeds every entry of the tenant that has no vector yet.
	pub async fn refresh_embeddings(&self, tenant_id: &str) -> Result<IngestReport> {
		if tenant_id.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "tenant_id must be non-empty.".to_string(),
			});
		}

		let missing = self.repo.list_missing_embeddings(tenant_id).await?;
		let now = OffsetDateTime::now_utc();
		let mut planned: Vec<Planned> = missing
			.into_iter()
			.map(|stored| {
				let embed_text = self.expander.expand(&stored.question_text);

				Planned {
					upsert: CanonicalUpsert {
						canonical_id: stored.canonical_id,
						tenant_id: stored.tenant_id,
						external_id: stored.external_id,
						question_text: stored.question_text,
						answer: stored.answer,
						evidence: stored.evidence,
						embedding: None,
						text_hash: Some(crate::text_hash(&embed_text)),
						now,
					},
					embed_text: Some(embed_text),
				}
			})
			.collect();
		let mut report = IngestReport {
			usage: self.embed_planned(&mut planned).await?,
			embedded: planned.len(),
			..IngestReport::default()
		};

		for p in &planned {
			self.repo.upsert_canonical(&p.upsert).await?;

			report.updated += 1;
		}

		tracing::info!(tenant_id, refreshed = report.updated, "Canonical embeddings refreshed.");

		Ok(report)
	}

	async fn embed_planned(&self, planned: &mut [Planned]) -> Result<EmbeddingUsage> {
		let texts: Vec<String> = planned.iter().filter_map(|p| p.embed_text.clone()).collect();

		if texts.is_empty() {
			return Ok(EmbeddingUsage::default());
		}

		let batch = self.embedding.embed_batch(&texts).await?;
		let mut vectors = batch.vectors.into_iter();

		for p in planned.iter_mut().filter(|p| p.embed_text.is_some()) {
			p.upsert.embedding = vectors.next();
		}

		Ok(batch.usage)
	}
}

fn validate_batch(tenant_id: &str, entries: &[CanonicalInput]) -> Result<()> {
	if tenant_id.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "tenant_id must be non-empty.".to_string() });
	}
	if entries.is_empty() {
		return Err(Error::InvalidRequest { message: "entries must be non-empty.".to_string() });
	}

	let mut seen = AHashSet::with_capacity(entries.len());

	for (index, input) in entries.iter().enumerate() {
		let external_id = input.external_id.trim();

		if external_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: format!("entries[{index}].external_id must be non-empty."),
			});
		}
		if input.question_text.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: format!("entries[{index}].question_text must be non-empty."),
			});
		}
		if !seen.insert(external_id) {
			return Err(Error::InvalidRequest {
				message: format!("entries[{index}].external_id {external_id:?} is duplicated."),
			});
		}
	}

	Ok(())
}

fn is_unchanged(stored: &CanonicalEntry, question_text: &str, input: &CanonicalInput) -> bool {
	stored.question_text == question_text
		&& stored.answer == input.answer
		&& stored.evidence == input.evidence
}

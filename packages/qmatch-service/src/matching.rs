//! Fallback chain: shortcut link, external id, fuzzy text, then one batch-wide semantic pass.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use qmatch_domain::{
	abbreviation::AbbreviationExpander,
	confidence::{ConfidenceClassifier, Decision, MatchMethod, Outcome, Thresholds},
	fuzzy::FuzzyMatcher,
	normalize::TextNormalizer,
};
use qmatch_storage::models::CanonicalEntry;

use crate::{
	EmbeddingClient, EmbeddingUsage, Error, MatchAuditLog, Repository, ScoredCanonical,
	SimilaritySearcher,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingQuestion {
	pub incoming_id: String,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRef {
	pub canonical_id: Uuid,
	pub external_id: String,
	pub question_text: String,
	pub answer: Value,
	pub evidence: Option<String>,
}
impl From<&CanonicalEntry> for CanonicalRef {
	fn from(entry: &CanonicalEntry) -> Self {
		Self {
			canonical_id: entry.canonical_id,
			external_id: entry.external_id.clone(),
			question_text: entry.question_text.clone(),
			answer: entry.answer.clone(),
			evidence: entry.evidence.clone(),
		}
	}
}

/// Per-question failure carried on a result. A batch never fails as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchError {
	InvalidInput { message: String },
	EmbeddingUnavailable { message: String },
	Storage { message: String },
}
impl MatchError {
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidInput { .. } => "INVALID_INPUT",
			Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
			Self::Storage { .. } => "STORAGE",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
	pub incoming_id: String,
	pub outcome: Outcome,
	pub method: MatchMethod,
	pub score: Option<f32>,
	/// Present for LINKED and CONFIRMATION_REQUIRED only.
	pub canonical: Option<CanonicalRef>,
	pub persist_link: bool,
	pub link_persisted: bool,
	pub error: Option<MatchError>,
}
impl MatchResult {
	fn classified(
		incoming_id: &str,
		method: MatchMethod,
		score: f32,
		decision: Decision,
		entry: &CanonicalEntry,
	) -> Self {
		let canonical = match decision.outcome {
			Outcome::NoMatch => None,
			Outcome::Linked | Outcome::ConfirmationRequired => Some(CanonicalRef::from(entry)),
		};

		Self {
			incoming_id: incoming_id.to_string(),
			outcome: decision.outcome,
			method,
			score: Some(score),
			canonical,
			persist_link: decision.persist_link,
			link_persisted: false,
			error: None,
		}
	}

	fn no_match(incoming_id: &str, method: MatchMethod, score: Option<f32>) -> Self {
		Self {
			incoming_id: incoming_id.to_string(),
			outcome: Outcome::NoMatch,
			method,
			score,
			canonical: None,
			persist_link: false,
			link_persisted: false,
			error: None,
		}
	}

	fn failed(incoming_id: &str, error: MatchError) -> Self {
		Self { error: Some(error), ..Self::no_match(incoming_id, MatchMethod::None, None) }
	}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchBatch {
	/// One result per input question, in input order.
	pub results: Vec<MatchResult>,
	pub usage: EmbeddingUsage,
}

/// Text handling and thresholds for the chain.
#[derive(Debug, Clone)]
pub struct MatchSettings {
	pub normalizer: TextNormalizer,
	pub fuzzy: FuzzyMatcher,
	pub classifier: ConfidenceClassifier,
	pub expander: AbbreviationExpander,
}
impl MatchSettings {
	pub fn from_config(cfg: &qmatch_config::Config) -> Self {
		Self {
			normalizer: TextNormalizer::from_config(&cfg.normalization),
			fuzzy: FuzzyMatcher::from_config(&cfg.matching),
			classifier: ConfidenceClassifier::new(Thresholds::from_config(&cfg.matching)),
			expander: AbbreviationExpander::from_config(&cfg.normalization),
		}
	}
}
impl Default for MatchSettings {
	fn default() -> Self {
		let matching = qmatch_config::Matching::default();
		let normalization = qmatch_config::Normalization::default();

		Self {
			normalizer: TextNormalizer::from_config(&normalization),
			fuzzy: FuzzyMatcher::from_config(&matching),
			classifier: ConfidenceClassifier::new(Thresholds::from_config(&matching)),
			expander: AbbreviationExpander::from_config(&normalization),
		}
	}
}

struct Snapshot {
	entries: Vec<CanonicalEntry>,
	normalized: Vec<String>,
	has_vectors: bool,
}

struct Pending {
	index: usize,
	embed_text: String,
}

#[derive(Clone)]
pub struct MatchOrchestrator {
	repo: Arc<dyn Repository>,
	embedding: EmbeddingClient,
	searcher: Arc<dyn SimilaritySearcher>,
	audit: MatchAuditLog,
	settings: MatchSettings,
}
impl MatchOrchestrator {
	pub fn new(
		repo: Arc<dyn Repository>,
		embedding: EmbeddingClient,
		searcher: Arc<dyn SimilaritySearcher>,
		settings: MatchSettings,
	) -> Self {
		let audit = MatchAuditLog::new(repo.clone());

		Self { repo, embedding, searcher, audit, settings }
	}

	pub async fn match_one(&self, tenant_id: &str, question: &IncomingQuestion) -> MatchResult {
		let mut batch = self.match_batch(tenant_id, std::slice::from_ref(question)).await;

		batch.results.pop().unwrap_or_else(|| {
			MatchResult::failed(
				&question.incoming_id,
				MatchError::InvalidInput { message: "Question produced no result.".to_string() },
			)
		})
	}

	/// Runs the chain for every question. Issues at most one embedding call for the whole batch.
	pub async fn match_batch(&self, tenant_id: &str, questions: &[IncomingQuestion]) -> MatchBatch {
		let mut slots: Vec<Option<MatchResult>> = (0..questions.len()).map(|_| None).collect();
		let mut unresolved = Vec::new();

		for (index, question) in questions.iter().enumerate() {
			if let Some(message) = invalid_input(tenant_id, question) {
				slots[index] =
					Some(MatchResult::failed(&question.incoming_id, MatchError::InvalidInput {
						message,
					}));

				continue;
			}

			match self.resolve_by_id(tenant_id, &question.incoming_id).await {
				Ok(Some(entry)) => {
					slots[index] = Some(self.id_result(&question.incoming_id, &entry));
				},
				Ok(None) => unresolved.push(index),
				Err(err) => {
					slots[index] = Some(storage_failure(&question.incoming_id, &err));
				},
			}
		}

		let mut pending = Vec::new();
		let mut has_vectors = false;

		if !unresolved.is_empty() {
			match self.load_snapshot(tenant_id).await {
				Ok(snapshot) => {
					has_vectors = snapshot.has_vectors;

					for index in unresolved {
						let question = &questions[index];

						match self.fuzzy_match(tenant_id, question, &snapshot).await {
							Some(result) => slots[index] = Some(result),
							None => pending.push(Pending {
								index,
								embed_text: self.settings.expander.expand(question.text.trim()),
							}),
						}
					}
				},
				Err(err) =>
					for index in unresolved {
						slots[index] = Some(storage_failure(&questions[index].incoming_id, &err));
					},
			}
		}

		// Nothing to compare against; spare the provider call.
		if !has_vectors {
			for p in pending.drain(..) {
				let incoming_id = &questions[p.index].incoming_id;

				slots[p.index] =
					Some(MatchResult::no_match(incoming_id, MatchMethod::Semantic, None));
			}
		}

		let usage = self.semantic_stage(tenant_id, questions, &pending, &mut slots).await;
		let results: Vec<MatchResult> = slots
			.into_iter()
			.zip(questions)
			.map(|(slot, question)| {
				slot.unwrap_or_else(|| {
					MatchResult::no_match(&question.incoming_id, MatchMethod::None, None)
				})
			})
			.collect();

		self.audit.record(tenant_id, &results).await;

		log_summary(tenant_id, &results, &usage);

		MatchBatch { results, usage }
	}

	async fn resolve_by_id(
		&self,
		tenant_id: &str,
		incoming_id: &str,
	) -> crate::Result<Option<CanonicalEntry>> {
		if let Some(entry) = self.repo.find_link(tenant_id, incoming_id).await? {
			return Ok(Some(entry));
		}

		self.repo.find_by_external_id(tenant_id, incoming_id).await
	}

	fn id_result(&self, incoming_id: &str, entry: &CanonicalEntry) -> MatchResult {
		let decision = self
			.settings
			.classifier
			.classify(1.0, MatchMethod::Id)
			.unwrap_or(Decision { outcome: Outcome::Linked, persist_link: false });

		MatchResult::classified(incoming_id, MatchMethod::Id, 1.0, decision, entry)
	}

	async fn load_snapshot(&self, tenant_id: &str) -> crate::Result<Snapshot> {
		let entries = self.repo.list_canonical(tenant_id).await?;
		let normalized = entries
			.iter()
			.map(|entry| self.settings.normalizer.normalize(&entry.question_text))
			.collect();
		let has_vectors = entries.iter().any(|entry| entry.embedding.is_some());

		Ok(Snapshot { entries, normalized, has_vectors })
	}

	async fn fuzzy_match(
		&self,
		tenant_id: &str,
		question: &IncomingQuestion,
		snapshot: &Snapshot,
	) -> Option<MatchResult> {
		let normalized = self.settings.normalizer.normalize(&question.text);
		let hit = self.settings.fuzzy.best_match(&normalized, &snapshot.normalized)?;
		let decision = self.settings.classifier.classify(hit.score, MatchMethod::Fuzzy)?;
		let entry = snapshot.entries.get(hit.index)?;
		let mut result = MatchResult::classified(
			&question.incoming_id,
			MatchMethod::Fuzzy,
			hit.score,
			decision,
			entry,
		);

		self.persist_link(tenant_id, &mut result).await;

		Some(result)
	}

	async fn semantic_stage(
		&self,
		tenant_id: &str,
		questions: &[IncomingQuestion],
		pending: &[Pending],
		slots: &mut [Option<MatchResult>],
	) -> EmbeddingUsage {
		if pending.is_empty() {
			return EmbeddingUsage::default();
		}

		let texts: Vec<String> = pending.iter().map(|p| p.embed_text.clone()).collect();
		let batch = match self.embedding.embed_batch(&texts).await {
			Ok(batch) => batch,
			Err(err) => {
				let message = err.to_string();

				for p in pending {
					slots[p.index] = Some(MatchResult::failed(
						&questions[p.index].incoming_id,
						MatchError::EmbeddingUnavailable { message: message.clone() },
					));
				}

				return EmbeddingUsage::default();
			},
		};
		let hits = match self.searcher.search_many(tenant_id, &batch.vectors, 1).await {
			Ok(hits) => hits,
			Err(err) => {
				for p in pending {
					slots[p.index] = Some(storage_failure(&questions[p.index].incoming_id, &err));
				}

				return batch.usage;
			},
		};

		for (p, top) in pending.iter().zip(hits) {
			let incoming_id = &questions[p.index].incoming_id;

			slots[p.index] = Some(self.semantic_result(tenant_id, incoming_id, top.first()).await);
		}

		batch.usage
	}

	async fn semantic_result(
		&self,
		tenant_id: &str,
		incoming_id: &str,
		top: Option<&ScoredCanonical>,
	) -> MatchResult {
		let Some(top) = top else {
			return MatchResult::no_match(incoming_id, MatchMethod::Semantic, None);
		};
		let Some(decision) = self.settings.classifier.classify(top.score, MatchMethod::Semantic)
		else {
			return MatchResult::no_match(incoming_id, MatchMethod::Semantic, Some(top.score));
		};
		let mut result = MatchResult::classified(
			incoming_id,
			MatchMethod::Semantic,
			top.score,
			decision,
			&top.entry,
		);

		self.persist_link(tenant_id, &mut result).await;

		result
	}

	async fn persist_link(&self, tenant_id: &str, result: &mut MatchResult) {
		if !result.persist_link || result.outcome != Outcome::Linked {
			return;
		}

		let Some(canonical_id) = result.canonical.as_ref().map(|c| c.canonical_id) else {
			return;
		};

		match self.repo.upsert_link(tenant_id, &result.incoming_id, canonical_id).await {
			Ok(()) => result.link_persisted = true,
			Err(err) => {
				tracing::warn!(
					tenant_id,
					incoming_id = result.incoming_id.as_str(),
					error = %err,
					"Shortcut link upsert failed."
				);
			},
		}
	}
}

fn invalid_input(tenant_id: &str, question: &IncomingQuestion) -> Option<String> {
	if tenant_id.trim().is_empty() {
		return Some("tenant_id must be non-empty.".to_string());
	}
	if question.incoming_id.trim().is_empty() {
		return Some("incoming_id must be non-empty.".to_string());
	}
	if question.text.trim().is_empty() {
		return Some("text must be non-empty.".to_string());
	}

	None
}

fn storage_failure(incoming_id: &str, err: &Error) -> MatchResult {
	tracing::warn!(incoming_id, error = %err, "Storage read failed during matching.");

	MatchResult::failed(incoming_id, MatchError::Storage { message: err.to_string() })
}

fn log_summary(tenant_id: &str, results: &[MatchResult], usage: &EmbeddingUsage) {
	let count_method = |method| results.iter().filter(|r| r.method == method).count();
	let count_outcome = |outcome| results.iter().filter(|r| r.outcome == outcome).count();

	tracing::info!(
		tenant_id,
		questions = results.len(),
		by_id = count_method(MatchMethod::Id),
		by_fuzzy = count_method(MatchMethod::Fuzzy),
		by_semantic = count_method(MatchMethod::Semantic),
		linked = count_outcome(Outcome::Linked),
		confirmation_required = count_outcome(Outcome::ConfirmationRequired),
		no_match = count_outcome(Outcome::NoMatch),
		errors = results.iter().filter(|r| r.error.is_some()).count(),
		embedded_texts = usage.texts,
		provider_calls = usage.provider_calls,
		"Match batch completed."
	);
}

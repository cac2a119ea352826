use std::sync::{Arc, atomic::Ordering};

use qmatch_domain::confidence::{MatchMethod, Outcome};
use qmatch_service::{MatchError, MemoryRepository};

use super::{
	FlakyRepository, ScriptedEmbedding, TENANT, at_cosine, orchestrator, policy, question, seed,
};

#[tokio::test]
async fn results_follow_input_order_one_per_question() {
	let repo = Arc::new(MemoryRepository::new());

	seed(&*repo, TENANT, "SEC-1", "Do you encrypt data at rest?", Some(vec![1.0, 0.0, 0.0]))
		.await;
	seed(&*repo, TENANT, "SEC-2", "Is there a documented incident response plan?", None)
		.await;

	let provider =
		Arc::new(ScriptedEmbedding::new().with_vector("Unrelated topic", at_cosine(0.1)));
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let questions = vec![
		question("q-semantic", "Unrelated topic"),
		question("SEC-1", "anything"),
		question("q-invalid", "   "),
		question("q-fuzzy", "Is there a documented incident-response plan"),
	];
	let batch = orchestrator.match_batch(TENANT, &questions).await;
	let ids: Vec<&str> = batch.results.iter().map(|r| r.incoming_id.as_str()).collect();

	assert_eq!(ids, vec!["q-semantic", "SEC-1", "q-invalid", "q-fuzzy"]);
	assert_eq!(batch.results[0].method, MatchMethod::Semantic);
	assert_eq!(batch.results[0].outcome, Outcome::NoMatch);
	assert_eq!(batch.results[1].method, MatchMethod::Id);
	assert_eq!(batch.results[2].method, MatchMethod::None);
	assert!(matches!(batch.results[2].error, Some(MatchError::InvalidInput { .. })));
	assert_eq!(batch.results[3].method, MatchMethod::Fuzzy);
	assert_eq!(batch.results[3].outcome, Outcome::Linked);
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn external_id_hit_is_linked_without_writing_a_link() {
	let repo = Arc::new(MemoryRepository::new());
	let canonical_id =
		seed(&*repo, TENANT, "GDPR-4", "Do you appoint a data protection officer?", None)
			.await;
	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let result = orchestrator.match_one(TENANT, &question("GDPR-4", "Completely different")).await;

	assert_eq!(result.outcome, Outcome::Linked);
	assert_eq!(result.method, MatchMethod::Id);
	assert_eq!(result.score, Some(1.0));
	assert!(!result.persist_link);
	assert_eq!(result.canonical.map(|c| c.canonical_id), Some(canonical_id));
	assert_eq!(repo.link_count(TENANT), 0);
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn fuzzy_link_short_circuits_the_next_run() {
	let repo = Arc::new(MemoryRepository::new());
	let canonical_id =
		seed(&*repo, TENANT, "OPS-9", "Do you perform annual penetration tests?", None)
			.await;
	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let incoming = question("vendor-17", "Do you perform annual penetration tests");
	let first = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(first.method, MatchMethod::Fuzzy);
	assert_eq!(first.outcome, Outcome::Linked);
	assert!(first.persist_link);
	assert!(first.link_persisted);
	assert_eq!(repo.link_target(TENANT, "vendor-17"), Some(canonical_id));

	let second = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(second.method, MatchMethod::Id);
	assert_eq!(second.outcome, Outcome::Linked);
	assert_eq!(second.canonical.map(|c| c.canonical_id), Some(canonical_id));
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn semantic_link_short_circuits_the_next_run() {
	let repo = Arc::new(MemoryRepository::new());
	let canonical_id = seed(
		&*repo,
		TENANT,
		"BCP-2",
		"Describe your business continuity plan.",
		Some(vec![1.0, 0.0, 0.0]),
	)
	.await;
	let provider = Arc::new(
		ScriptedEmbedding::new()
			.with_vector("How do you keep operating during outages?", at_cosine(0.95)),
	);
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let incoming = question("vendor-3", "How do you keep operating during outages?");
	let first = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(first.method, MatchMethod::Semantic);
	assert_eq!(first.outcome, Outcome::Linked);
	assert!(first.link_persisted);

	let second = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(second.method, MatchMethod::Id);
	assert_eq!(second.canonical.map(|c| c.canonical_id), Some(canonical_id));
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn whole_batch_shares_one_embedding_call() {
	let repo = Arc::new(MemoryRepository::new());

	seed(&*repo, TENANT, "AC-1", "Do you enforce least privilege?", Some(vec![1.0, 0.0, 0.0]))
		.await;

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let questions: Vec<_> = (0..5)
		.map(|i| question(&format!("q-{i}"), &format!("Question about subject number {i}")))
		.collect();
	let batch = orchestrator.match_batch(TENANT, &questions).await;

	assert_eq!(batch.results.len(), 5);
	assert_eq!(provider.calls(), 1);
	assert_eq!(provider.seen()[0].len(), 5);
	assert_eq!(batch.usage.texts, 5);
	assert_eq!(batch.usage.provider_calls, 1);
}

#[tokio::test]
async fn blank_tenant_fails_every_question_without_calls() {
	let repo = Arc::new(MemoryRepository::new());
	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let batch = orchestrator
		.match_batch(" ", &[question("a", "One question"), question("b", "Another question")])
		.await;

	assert_eq!(batch.results.len(), 2);

	for result in &batch.results {
		assert_eq!(result.outcome, Outcome::NoMatch);
		assert_eq!(result.method, MatchMethod::None);
		assert_eq!(result.error.as_ref().map(MatchError::code), Some("INVALID_INPUT"));
	}

	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn empty_library_is_no_match_without_provider_call() {
	let repo = Arc::new(MemoryRepository::new());
	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let incoming = question("q", "Do you have a SOC 2 report?");
	let result = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(result.outcome, Outcome::NoMatch);
	assert_eq!(result.method, MatchMethod::Semantic);
	assert_eq!(result.score, None);
	assert!(result.canonical.is_none());
	assert!(result.error.is_none());
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
	let repo = Arc::new(MemoryRepository::new());

	seed(&*repo, "tenant-b", "HR-1", "Do you run background checks on staff?", None).await;

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let by_id = orchestrator.match_one(TENANT, &question("HR-1", "x")).await;
	let by_text = orchestrator
		.match_one(TENANT, &question("q", "Do you run background checks on staff?"))
		.await;

	assert_ne!(by_id.method, MatchMethod::Id);
	assert_eq!(by_id.outcome, Outcome::NoMatch);
	assert_eq!(by_text.outcome, Outcome::NoMatch);
	assert_ne!(by_text.method, MatchMethod::Fuzzy);
}

#[tokio::test]
async fn failed_link_write_keeps_the_outcome() {
	let memory = Arc::new(MemoryRepository::new());

	seed(&*memory, TENANT, "NET-5", "Are firewalls reviewed every quarter?", None).await;

	let flaky = Arc::new(FlakyRepository::new(memory.clone()));

	flaky.fail_link_writes.store(true, Ordering::SeqCst);

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(flaky.clone(), provider, policy());
	let incoming = question("v-1", "Are firewalls reviewed every quarter");
	let result = orchestrator.match_one(TENANT, &incoming).await;

	assert_eq!(result.outcome, Outcome::Linked);
	assert_eq!(result.method, MatchMethod::Fuzzy);
	assert!(result.persist_link);
	assert!(!result.link_persisted);
	assert!(result.error.is_none());
	assert_eq!(memory.link_count(TENANT), 0);
	assert_eq!(memory.audit_records().len(), 1);
}

#[tokio::test]
async fn failed_audit_write_still_returns_results() {
	let memory = Arc::new(MemoryRepository::new());

	seed(&*memory, TENANT, "NET-6", "Is remote access protected by VPN?", None).await;

	let flaky = Arc::new(FlakyRepository::new(memory.clone()));

	flaky.fail_audit.store(true, Ordering::SeqCst);

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(flaky.clone(), provider, policy());
	let batch = orchestrator
		.match_batch(TENANT, &[question("v-2", "Is remote access protected by VPN")])
		.await;

	assert_eq!(batch.results.len(), 1);
	assert_eq!(batch.results[0].outcome, Outcome::Linked);
	assert!(memory.audit_records().is_empty());
}

#[tokio::test]
async fn storage_read_failure_is_reported_per_question() {
	let memory = Arc::new(MemoryRepository::new());

	seed(&*memory, TENANT, "LOG-1", "Are audit logs retained for a year?", None).await;

	let flaky = Arc::new(FlakyRepository::new(memory.clone()));

	flaky.fail_reads.store(true, Ordering::SeqCst);

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(flaky.clone(), provider.clone(), policy());
	let batch = orchestrator
		.match_batch(TENANT, &[question("LOG-1", "x"), question("v-3", "Are audit logs retained")])
		.await;

	assert_eq!(batch.results.len(), 2);

	for result in &batch.results {
		assert_eq!(result.outcome, Outcome::NoMatch);
		assert_eq!(result.method, MatchMethod::None);
		assert_eq!(result.error.as_ref().map(MatchError::code), Some("STORAGE"));
	}

	assert_eq!(provider.calls(), 0);

	let audit = memory.audit_records();

	assert_eq!(audit.len(), 2);
	assert!(audit.iter().all(|record| record.error_code.as_deref() == Some("STORAGE")));
}

#[tokio::test]
async fn every_result_is_audited_with_its_method_and_outcome() {
	let repo = Arc::new(MemoryRepository::new());

	seed(&*repo, TENANT, "PRIV-1", "Do you sell personal data?", None).await;

	let provider = Arc::new(ScriptedEmbedding::new());
	let orchestrator = orchestrator(repo.clone(), provider, policy());

	let questions = [question("PRIV-1", "x"), question("v-9", "Do you sell personal data")];

	orchestrator.match_batch(TENANT, &questions).await;

	let audit = repo.audit_records();
	let summary: Vec<(&str, &str, &str)> = audit
		.iter()
		.map(|r| (r.incoming_id.as_str(), r.method.as_str(), r.outcome.as_str()))
		.collect();

	assert_eq!(summary, vec![("PRIV-1", "ID", "LINKED"), ("v-9", "FUZZY", "LINKED")]);
	assert!(audit.iter().all(|r| r.tenant_id == TENANT && r.canonical_id.is_some()));
}

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use qmatch_domain::confidence::{MatchMethod, Outcome};
use qmatch_providers::Error as ProviderError;
use qmatch_service::{EmbeddingClient, EmbeddingPolicy, Error, MatchError, MemoryRepository};

use super::{ScriptedEmbedding, TENANT, orchestrator, policy, question, seed};

fn numbered(count: usize) -> (ScriptedEmbedding, Vec<String>) {
	let mut provider = ScriptedEmbedding::new();
	let mut texts = Vec::with_capacity(count);

	for i in 0..count {
		let text = format!("t{i}");

		provider = provider.with_vector(&text, vec![i as f32, 1.0]);

		texts.push(text);
	}

	(provider, texts)
}

fn rate_limited() -> ProviderError {
	ProviderError::RateLimited { status: 429 }
}

fn unavailable() -> ProviderError {
	ProviderError::Transient { message: "503 Service Unavailable".to_string() }
}

#[tokio::test]
async fn chunks_in_order_with_ceiling_call_count() {
	let (provider, texts) = numbered(10);
	let provider = Arc::new(provider);
	let client =
		EmbeddingClient::new(provider.clone(), EmbeddingPolicy { chunk_size: 3, ..policy() });
	let batch = client.embed_batch(&texts).await.expect("Embedding batch failed.");
	let firsts: Vec<f32> = batch.vectors.iter().map(|v| v[0]).collect();

	assert_eq!(firsts, (0..10).map(|i| i as f32).collect::<Vec<_>>());
	assert_eq!(provider.calls(), 4);
	assert_eq!(batch.usage.chunks, 4);
	assert_eq!(batch.usage.provider_calls, 4);
	assert_eq!(batch.usage.texts, 10);
	assert_eq!(batch.usage.chars, texts.iter().map(String::len).sum::<usize>());

	let mut sizes: Vec<usize> = provider.seen().iter().map(Vec::len).collect();

	sizes.sort_unstable();

	assert_eq!(sizes, vec![1, 3, 3, 3]);
}

#[tokio::test]
async fn empty_input_makes_no_call() {
	let provider = Arc::new(ScriptedEmbedding::new());
	let client = EmbeddingClient::new(provider.clone(), policy());
	let batch = client.embed_batch(&[]).await.expect("Embedding batch failed.");

	assert!(batch.vectors.is_empty());
	assert_eq!(batch.usage.provider_calls, 0);
	assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_chunks_stay_within_the_limit() {
	let (provider, texts) = numbered(8);
	let provider = Arc::new(provider.with_delay(Duration::from_millis(50)));
	let client = EmbeddingClient::new(
		provider.clone(),
		EmbeddingPolicy { chunk_size: 1, max_concurrent_chunks: 2, ..policy() },
	);
	let batch = client.embed_batch(&texts).await.expect("Embedding batch failed.");

	assert_eq!(batch.vectors.len(), 8);
	assert_eq!(provider.calls(), 8);
	assert!(provider.max_in_flight() <= 2, "max in flight: {}", provider.max_in_flight());
}

#[tokio::test(start_paused = true)]
async fn rate_limits_retry_with_doubling_backoff() {
	let (provider, texts) = numbered(2);
	let provider = Arc::new(provider.failing_first(vec![rate_limited(), rate_limited()]));
	let client = EmbeddingClient::new(provider.clone(), policy());
	let started = Instant::now();
	let batch = client.embed_batch(&texts).await.expect("Embedding batch failed.");

	assert_eq!(provider.calls(), 3);
	assert_eq!(batch.backoffs, vec![Duration::from_secs(2), Duration::from_secs(4)]);
	assert_eq!(batch.usage.provider_calls, 3);
	assert!(started.elapsed() >= Duration::from_secs(6));
	assert_eq!(batch.vectors.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_whole_batch() {
	let (provider, texts) = numbered(4);
	let provider = Arc::new(provider.always_failing(unavailable));
	let client = EmbeddingClient::new(provider.clone(), policy());
	let started = Instant::now();
	let err = client.embed_batch(&texts).await.expect_err("Expected the batch to fail.");

	match err {
		Error::EmbeddingUnavailable { provider_calls, .. } => assert_eq!(provider_calls, 3),
		other => panic!("Unexpected error: {other:?}"),
	}

	assert_eq!(provider.calls(), 3);
	assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test]
async fn rejected_request_is_not_retried() {
	let (provider, texts) = numbered(2);
	let provider = Arc::new(provider.always_failing(|| ProviderError::Rejected {
		status: 401,
		message: "invalid api key".to_string(),
	}));
	let client = EmbeddingClient::new(provider.clone(), policy());
	let err = client.embed_batch(&texts).await.expect_err("Expected the batch to fail.");

	assert!(matches!(err, Error::EmbeddingUnavailable { provider_calls: 1, .. }), "{err:?}");
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn vector_count_mismatch_fails_without_retry() {
	let (provider, texts) = numbered(3);
	let provider = Arc::new(provider.dropping_last_vector());
	let client = EmbeddingClient::new(provider.clone(), policy());
	let err = client.embed_batch(&texts).await.expect_err("Expected the batch to fail.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }), "{err:?}");
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn one_failed_chunk_discards_the_others() {
	let (provider, texts) = numbered(6);
	let provider = Arc::new(provider.poisoned_by("t4"));
	let client =
		EmbeddingClient::new(provider.clone(), EmbeddingPolicy { chunk_size: 2, ..policy() });
	let result = client.embed_batch(&texts).await;

	assert!(matches!(result, Err(Error::EmbeddingUnavailable { .. })));
}

#[tokio::test(start_paused = true)]
async fn batch_deadline_bounds_a_hung_provider() {
	let (provider, texts) = numbered(2);
	let provider = Arc::new(provider.with_delay(Duration::from_secs(600)));
	let client = EmbeddingClient::new(provider.clone(), policy());
	let started = Instant::now();
	let err = client.embed_batch(&texts).await.expect_err("Expected the deadline to fire.");

	assert!(matches!(err, Error::EmbeddingUnavailable { provider_calls: 1, .. }), "{err:?}");
	assert!(started.elapsed() >= Duration::from_secs(90));
	assert!(started.elapsed() < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn embedding_outage_only_affects_semantic_questions() {
	let repo = Arc::new(MemoryRepository::new());

	seed(&*repo, TENANT, "DR-1", "How often are backups tested?", Some(vec![1.0, 0.0, 0.0]))
		.await;

	let provider = Arc::new(ScriptedEmbedding::new().always_failing(unavailable));
	let orchestrator = orchestrator(repo.clone(), provider.clone(), policy());
	let batch = orchestrator
		.match_batch(TENANT, &[
			question("DR-1", "x"),
			question("v-1", "How often are backups tested"),
			question("v-2", "What cloud regions do you operate in?"),
			question("v-3", "Do you have a bug bounty program?"),
		])
		.await;
	let results = &batch.results;

	assert_eq!(results[0].method, MatchMethod::Id);
	assert_eq!(results[0].outcome, Outcome::Linked);
	assert_eq!(results[1].method, MatchMethod::Fuzzy);
	assert_eq!(results[1].outcome, Outcome::Linked);

	for result in &results[2..] {
		assert_eq!(result.outcome, Outcome::NoMatch);
		assert_eq!(result.method, MatchMethod::None);
		assert!(result.canonical.is_none());
		assert!(matches!(result.error, Some(MatchError::EmbeddingUnavailable { .. })));
	}

	assert_eq!(provider.calls(), 3);

	let audit = repo.audit_records();
	let failed: Vec<&str> = audit
		.iter()
		.filter(|r| r.error_code.as_deref() == Some("EMBEDDING_UNAVAILABLE"))
		.map(|r| r.incoming_id.as_str())
		.collect();

	assert_eq!(failed, vec!["v-2", "v-3"]);
}

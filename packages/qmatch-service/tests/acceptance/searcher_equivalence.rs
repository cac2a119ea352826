use std::sync::Arc;

use qmatch_service::{
	Error, InProcessSearcher, MemoryRepository, NativeSearcher, Repository, SimilaritySearcher,
	VectorStrategy, search,
};

use super::{TENANT, seed};

async fn library(repo: &dyn Repository) {
	seed(repo, TENANT, "A", "Alpha", Some(vec![1.0, 0.0, 0.0])).await;
	seed(repo, TENANT, "B", "Bravo", Some(vec![0.6, 0.8, 0.0])).await;
	// Same direction as B; insertion order decides.
	seed(repo, TENANT, "C", "Charlie", Some(vec![0.3, 0.4, 0.0])).await;
	seed(repo, TENANT, "D", "Delta", None).await;
	seed(repo, TENANT, "E", "Echo", Some(vec![1.0, 0.0])).await;
	seed(repo, TENANT, "F", "Foxtrot", Some(vec![0.0, 0.0, 1.0])).await;
	seed(repo, "tenant-b", "Z", "Zulu", Some(vec![0.6, 0.8, 0.0])).await;
}

fn external_ids(hits: &[qmatch_service::ScoredCanonical]) -> Vec<&str> {
	hits.iter().map(|hit| hit.entry.external_id.as_str()).collect()
}

#[tokio::test]
async fn native_and_in_process_agree_on_ranking() {
	let repo = Arc::new(MemoryRepository::with_native_vector());

	library(&*repo).await;

	let native = NativeSearcher::new(repo.clone());
	let in_process = InProcessSearcher::new(repo.clone());
	let queries =
		[vec![0.6, 0.8, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 0.1, 1.0], vec![0.5, 0.5, 0.5]];

	for query in &queries {
		let a = native.search(TENANT, query, 3).await.expect("Native search failed.");
		let b = in_process.search(TENANT, query, 3).await.expect("In-process search failed.");

		assert_eq!(external_ids(&a), external_ids(&b), "query {query:?}");

		for (x, y) in a.iter().zip(&b) {
			assert!((x.score - y.score).abs() < 1e-6);
		}
	}
}

#[tokio::test]
async fn ties_resolve_to_the_earliest_entry() {
	let repo = Arc::new(MemoryRepository::with_native_vector());

	library(&*repo).await;

	let searcher = InProcessSearcher::new(repo.clone());
	let hits = searcher.search(TENANT, &[0.6, 0.8, 0.0], 2).await.expect("Search failed.");

	assert_eq!(external_ids(&hits), vec!["B", "C"]);
	assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn entries_without_comparable_vectors_are_skipped() {
	let repo = Arc::new(MemoryRepository::new());

	library(&*repo).await;

	let searcher = InProcessSearcher::new(repo.clone());
	let hits = searcher.search(TENANT, &[1.0, 0.0, 0.0], 10).await.expect("Search failed.");
	let ids = external_ids(&hits);

	assert_eq!(ids, vec!["A", "B", "C", "F"]);
	assert!(!ids.contains(&"D"));
	assert!(!ids.contains(&"E"));
	assert!(!ids.contains(&"Z"));
}

#[tokio::test]
async fn empty_tenant_returns_no_hits() {
	let repo = Arc::new(MemoryRepository::with_native_vector());
	let native = NativeSearcher::new(repo.clone());
	let in_process = InProcessSearcher::new(repo.clone());

	let native_hits = native.search(TENANT, &[1.0, 0.0, 0.0], 1).await.expect("Search failed.");
	let in_process_hits =
		in_process.search(TENANT, &[1.0, 0.0, 0.0], 1).await.expect("Search failed.");

	assert!(native_hits.is_empty());
	assert!(in_process_hits.is_empty());
}

#[tokio::test]
async fn search_many_keeps_query_order() {
	let repo = Arc::new(MemoryRepository::new());

	library(&*repo).await;

	let searcher = InProcessSearcher::new(repo.clone());
	let queries = vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]];
	let hits = searcher.search_many(TENANT, &queries, 1).await.expect("Search failed.");

	assert_eq!(hits.len(), 2);
	assert_eq!(external_ids(&hits[0]), vec!["F"]);
	assert_eq!(external_ids(&hits[1]), vec!["A"]);
}

#[test]
fn strategy_selection_follows_setting_and_capability() {
	assert_eq!(VectorStrategy::select("auto", true).ok(), Some(VectorStrategy::Native));
	assert_eq!(VectorStrategy::select("auto", false).ok(), Some(VectorStrategy::InProcess));
	assert_eq!(VectorStrategy::select("native", true).ok(), Some(VectorStrategy::Native));
	assert_eq!(VectorStrategy::select("in_process", true).ok(), Some(VectorStrategy::InProcess));
	assert!(matches!(VectorStrategy::select("native", false), Err(Error::Config { .. })));
	assert!(matches!(VectorStrategy::select("brute", true), Err(Error::Config { .. })));
}

#[test]
fn build_searcher_uses_repository_capability() {
	let native: Arc<dyn Repository> = Arc::new(MemoryRepository::with_native_vector());
	let plain: Arc<dyn Repository> = Arc::new(MemoryRepository::new());

	assert_eq!(
		search::build_searcher(native, "auto").map(|s| s.strategy()).ok(),
		Some(VectorStrategy::Native)
	);
	assert_eq!(
		search::build_searcher(plain.clone(), "auto").map(|s| s.strategy()).ok(),
		Some(VectorStrategy::InProcess)
	);
	assert!(search::build_searcher(plain, "native").is_err());
}

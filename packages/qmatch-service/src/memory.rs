use std::{
	cmp::Ordering,
	sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ahash::AHashMap;
use uuid::Uuid;

use qmatch_domain::vector;
use qmatch_storage::models::{CanonicalEntry, CanonicalUpsert, MatchAudit};

use crate::{BoxFuture, Error, Repository, Result, ScoredCanonical};

/// Process-local repository. Backs tests and dry runs without Postgres.
///
/// With `native_vector` set it answers [`Repository::nearest_canonical`] itself, mirroring the
/// ordering of the Postgres vector query.
pub struct MemoryRepository {
	native_vector: bool,
	state: RwLock<State>,
}

#[derive(Default)]
struct State {
	next_seq: i64,
	canonical: Vec<CanonicalEntry>,
	by_external_id: AHashMap<(String, String), usize>,
	links: AHashMap<(String, String), Uuid>,
	audit: Vec<MatchAudit>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self { native_vector: false, state: RwLock::new(State::default()) }
	}

	pub fn with_native_vector() -> Self {
		Self { native_vector: true, state: RwLock::new(State::default()) }
	}

	pub fn link_count(&self, tenant_id: &str) -> usize {
		self.read().links.keys().filter(|(tenant, _)| tenant == tenant_id).count()
	}

	pub fn link_target(&self, tenant_id: &str, incoming_id: &str) -> Option<Uuid> {
		self.read().links.get(&(tenant_id.to_string(), incoming_id.to_string())).copied()
	}

	pub fn audit_records(&self) -> Vec<MatchAudit> {
		self.read().audit.clone()
	}

	fn read(&self) -> RwLockReadGuard<'_, State> {
		self.state.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, State> {
		self.state.write().unwrap_or_else(|err| err.into_inner())
	}

	fn tenant_entries(&self, tenant_id: &str) -> Vec<CanonicalEntry> {
		self.read().canonical.iter().filter(|entry| entry.tenant_id == tenant_id).cloned().collect()
	}
}
impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

impl Repository for MemoryRepository {
	fn supports_native_vector(&self) -> bool {
		self.native_vector
	}

	fn find_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>> {
		Box::pin(async move {
			let state = self.read();
			let Some(canonical_id) =
				state.links.get(&(tenant_id.to_string(), incoming_id.to_string()))
			else {
				return Ok(None);
			};

			Ok(state
				.canonical
				.iter()
				.find(|entry| entry.tenant_id == tenant_id && entry.canonical_id == *canonical_id)
				.cloned())
		})
	}

	fn find_by_external_id<'a>(
		&'a self,
		tenant_id: &'a str,
		external_id: &'a str,
	) -> BoxFuture<'a, Result<Option<CanonicalEntry>>> {
		Box::pin(async move {
			let state = self.read();

			Ok(state
				.by_external_id
				.get(&(tenant_id.to_string(), external_id.to_string()))
				.map(|index| state.canonical[*index].clone()))
		})
	}

	fn list_canonical<'a>(
		&'a self,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CanonicalEntry>>> {
		Box::pin(async move { Ok(self.tenant_entries(tenant_id)) })
	}

	fn upsert_link<'a>(
		&'a self,
		tenant_id: &'a str,
		incoming_id: &'a str,
		canonical_id: Uuid,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let key = (tenant_id.to_string(), incoming_id.to_string());

			self.write().links.insert(key, canonical_id);

			Ok(())
		})
	}

	fn append_audit<'a>(&'a self, records: &'a [MatchAudit]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.write().audit.extend_from_slice(records);

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
			if !self.native_vector {
				return Err(Error::Storage {
					message: "Vector search is not supported by this repository.".to_string(),
				});
			}

			let mut hits: Vec<ScoredCanonical> = self
				.tenant_entries(tenant_id)
				.into_iter()
				.filter_map(|entry| {
					let embedding = entry.embedding.as_deref()?;

					if embedding.len() != query.len() {
						return None;
					}

					let score = vector::cosine_similarity(query, embedding);

					Some(ScoredCanonical { entry, score })
				})
				.collect();

			hits.sort_by(|a, b| {
				b.score
					.partial_cmp(&a.score)
					.unwrap_or(Ordering::Equal)
					.then_with(|| a.entry.seq.cmp(&b.entry.seq))
			});
			hits.truncate(top_k);

			Ok(hits)
		})
	}

	fn upsert_canonical<'a>(
		&'a self,
		entry: &'a CanonicalUpsert,
	) -> BoxFuture<'a, Result<(Uuid, bool)>> {
		Box::pin(async move {
			let mut state = self.write();
			let key = (entry.tenant_id.clone(), entry.external_id.clone());

			if let Some(index) = state.by_external_id.get(&key).copied() {
				let stored = &mut state.canonical[index];

				stored.question_text = entry.question_text.clone();
				stored.answer = entry.answer.clone();
				stored.evidence = entry.evidence.clone();
				stored.embedding = entry.embedding.clone();
				stored.text_hash = entry.text_hash.clone();
				stored.updated_at = entry.now;

				return Ok((stored.canonical_id, false));
			}

			state.next_seq += 1;

			let seq = state.next_seq;
			let index = state.canonical.len();

			state.canonical.push(CanonicalEntry {
				canonical_id: entry.canonical_id,
				seq,
				tenant_id: entry.tenant_id.clone(),
				external_id: entry.external_id.clone(),
				question_text: entry.question_text.clone(),
				answer: entry.answer.clone(),
				evidence: entry.evidence.clone(),
				embedding: entry.embedding.clone(),
				text_hash: entry.text_hash.clone(),
				created_at: entry.now,
				updated_at: entry.now,
			});
			state.by_external_id.insert(key, index);

			Ok((entry.canonical_id, true))
		})
	}

	fn list_missing_embeddings<'a>(
		&'a self,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CanonicalEntry>>> {
		Box::pin(async move {
			Ok(self
				.tenant_entries(tenant_id)
				.into_iter()
				.filter(|entry| entry.embedding.is_none())
				.collect())
		})
	}
}

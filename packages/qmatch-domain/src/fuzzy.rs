//! Bounded-cost fuzzy similarity over normalized text.
//!
//! The score is the insertion/deletion ratio `2 * LCS / (len(a) + len(b))`, counted in Unicode
//! scalar values. It tolerates dropped letters and split words ("whats" vs "what is") better
//! than a plain Levenshtein ratio over the longer string.

use rapidfuzz::distance::indel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefilter {
	/// Skip candidates whose length alone caps the ratio at or below the bar to beat.
	LengthBound,
	/// Compare against every candidate.
	None,
}
impl Prefilter {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"length_bound" => Some(Self::LengthBound),
			"none" => Some(Self::None),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyHit {
	/// Position of the winning candidate in the slice passed to [`FuzzyMatcher::best_match`].
	pub index: usize,
	pub score: f32,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
	threshold: f32,
	prefilter: Prefilter,
	max_chars: usize,
}
impl FuzzyMatcher {
	pub fn new(threshold: f32, prefilter: Prefilter, max_chars: usize) -> Self {
		Self { threshold, prefilter, max_chars }
	}

	pub fn from_config(cfg: &qmatch_config::Matching) -> Self {
		let prefilter = Prefilter::parse(&cfg.fuzzy.prefilter).unwrap_or(Prefilter::LengthBound);

		Self::new(cfg.fuzzy_threshold, prefilter, cfg.fuzzy.max_chars as usize)
	}

	/// Best candidate for `query`, first-inserted winning ties.
	///
	/// Both sides must already be normalized. Returns `None` when the query is empty or longer
	/// than the configured bound, or when the prefilter rules out every candidate.
	pub fn best_match<S>(&self, query: &str, candidates: &[S]) -> Option<FuzzyHit>
	where
		S: AsRef<str>,
	{
		let query_len = query.chars().count();

		if query_len == 0 || query_len > self.max_chars {
			return None;
		}

		let mut best: Option<FuzzyHit> = None;

		for (index, candidate) in candidates.iter().enumerate() {
			let candidate = candidate.as_ref();
			let candidate_len = candidate.chars().count();

			if self.prefilter == Prefilter::LengthBound {
				let bar = best.map(|hit| hit.score.max(self.threshold)).unwrap_or(self.threshold);

				if upper_bound(query_len, candidate_len) <= bar {
					continue;
				}
			}

			let score = similarity(query, candidate);

			if best.map(|hit| score > hit.score).unwrap_or(true) {
				best = Some(FuzzyHit { index, score });
			}
		}

		best
	}
}

/// Similarity in `[0, 1]`; symmetric, and 1.0 for two empty strings.
pub fn similarity(a: &str, b: &str) -> f32 {
	if a.is_empty() && b.is_empty() {
		return 1.0;
	}

	indel::normalized_similarity(a.chars(), b.chars()) as f32
}

/// Highest ratio two strings of these lengths could reach.
pub fn upper_bound(len_a: usize, len_b: usize) -> f32 {
	let total = len_a + len_b;

	if total == 0 {
		return 1.0;
	}

	(2 * len_a.min(len_b)) as f32 / total as f32
}

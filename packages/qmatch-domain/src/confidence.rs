use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
	Id,
	Fuzzy,
	Semantic,
	None,
}
impl MatchMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Id => "ID",
			Self::Fuzzy => "FUZZY",
			Self::Semantic => "SEMANTIC",
			Self::None => "NONE",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
	Linked,
	ConfirmationRequired,
	NoMatch,
}
impl Outcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Linked => "LINKED",
			Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
			Self::NoMatch => "NO_MATCH",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
	pub fuzzy: f32,
	pub semantic_high: f32,
	pub semantic_medium: f32,
	pub high_inclusive: bool,
}
impl Thresholds {
	pub fn from_config(cfg: &qmatch_config::Matching) -> Self {
		Self {
			fuzzy: cfg.fuzzy_threshold,
			semantic_high: cfg.semantic_high_threshold,
			semantic_medium: cfg.semantic_medium_threshold,
			high_inclusive: cfg.high_threshold_inclusive,
		}
	}
}
impl Default for Thresholds {
	fn default() -> Self {
		Self::from_config(&qmatch_config::Matching::default())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
	pub outcome: Outcome,
	pub persist_link: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceClassifier {
	thresholds: Thresholds,
}
impl ConfidenceClassifier {
	pub fn new(thresholds: Thresholds) -> Self {
		Self { thresholds }
	}

	/// Maps a score from `method` to a tier.
	///
	/// A fuzzy score at or below the fuzzy threshold yields `None`: the question moves on to the
	/// semantic stage instead of being classified.
	pub fn classify(&self, score: f32, method: MatchMethod) -> Option<Decision> {
		match method {
			MatchMethod::Id => Some(Decision { outcome: Outcome::Linked, persist_link: false }),
			MatchMethod::Fuzzy => (score > self.thresholds.fuzzy)
				.then_some(Decision { outcome: Outcome::Linked, persist_link: true }),
			MatchMethod::Semantic => Some(self.classify_semantic(score)),
			MatchMethod::None => Some(Decision { outcome: Outcome::NoMatch, persist_link: false }),
		}
	}

	fn classify_semantic(&self, score: f32) -> Decision {
		let Thresholds { semantic_high, semantic_medium, high_inclusive, .. } = self.thresholds;
		let high = if high_inclusive { score >= semantic_high } else { score > semantic_high };

		if high {
			return Decision { outcome: Outcome::Linked, persist_link: true };
		}
		if score >= semantic_medium {
			return Decision { outcome: Outcome::ConfirmationRequired, persist_link: false };
		}

		Decision { outcome: Outcome::NoMatch, persist_link: false }
	}
}

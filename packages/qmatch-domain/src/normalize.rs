use unicode_normalization::UnicodeNormalization;

const MAX_FOLDS: usize = 4;

/// Canonical form used by every text comparison in the fallback chain.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
	punctuation: Vec<char>,
}
impl TextNormalizer {
	pub fn new(punctuation: &str) -> Self {
		let mut punctuation: Vec<char> = punctuation.chars().collect();

		punctuation.sort_unstable();
		punctuation.dedup();

		Self { punctuation }
	}

	pub fn from_config(cfg: &qmatch_config::Normalization) -> Self {
		Self::new(&cfg.punctuation)
	}

	/// NFKC fold, lower-case, drop punctuation, collapse whitespace. Total and idempotent.
	pub fn normalize(&self, text: &str) -> String {
		let mut current = self.fold(text);

		// Dropping punctuation can leave a base letter next to a combining mark that only a
		// second fold composes.
		for _ in 0..MAX_FOLDS {
			let next = self.fold(&current);

			if next == current {
				break;
			}

			current = next;
		}

		current
	}

	fn fold(&self, text: &str) -> String {
		let mut out = String::with_capacity(text.len());
		let mut pending_space = false;

		for ch in text.nfkc().flat_map(char::to_lowercase) {
			if self.is_punctuation(ch) {
				continue;
			}
			if ch.is_whitespace() {
				pending_space = !out.is_empty();

				continue;
			}
			if pending_space {
				out.push(' ');

				pending_space = false;
			}

			out.push(ch);
		}

		out
	}

	fn is_punctuation(&self, ch: char) -> bool {
		self.punctuation.binary_search(&ch).is_ok()
	}
}
impl Default for TextNormalizer {
	fn default() -> Self {
		Self::new(qmatch_config::DEFAULT_PUNCTUATION)
	}
}

pub fn normalize(text: &str) -> String {
	TextNormalizer::default().normalize(text)
}

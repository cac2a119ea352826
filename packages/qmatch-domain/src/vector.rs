/// Cosine similarity in `[-1, 1]`, accumulated in `f64`.
///
/// Returns `0.0` for empty or mismatched vectors and for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	let denom = norm_a.sqrt() * norm_b.sqrt();

	if denom < f64::from(f32::EPSILON) {
		return 0.0;
	}

	(dot / denom).clamp(-1.0, 1.0) as f32
}

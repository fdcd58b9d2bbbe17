use promptimize_types::Answer;
use strsim::levenshtein;

use crate::evaluator::Evaluator;

/// Normalized Levenshtein similarity between the answer and an expected
/// string.
pub struct Similarity {
	expected: String,
}

impl Similarity {
	pub fn new(expected: impl Into<String>) -> Self {
		Self {
			expected: expected.into(),
		}
	}
}

impl Evaluator for Similarity {
	fn name(&self) -> &str {
		"levenshtein"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		let output = answer.as_text();
		let max_len = self
			.expected
			.chars()
			.count()
			.max(output.chars().count())
			.max(1) as f64;
		(1.0 - levenshtein(&self.expected, &output) as f64 / max_len).clamp(0.0, 1.0)
	}
}

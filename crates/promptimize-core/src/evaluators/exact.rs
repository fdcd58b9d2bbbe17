use promptimize_types::Answer;

use crate::evaluator::{score_of, Evaluator};

/// Exact match against an expected string, ignoring surrounding whitespace.
pub struct Equals {
	expected: String,
}

impl Equals {
	pub fn new(expected: impl Into<String>) -> Self {
		Self {
			expected: expected.into(),
		}
	}
}

impl Evaluator for Equals {
	fn name(&self) -> &str {
		"exact_match"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		score_of(answer.as_text().trim() == self.expected.trim())
	}
}

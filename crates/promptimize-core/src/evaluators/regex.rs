use anyhow::Result;
use promptimize_types::Answer;
use regex::Regex;

use crate::evaluator::{score_of, Evaluator};

/// Checks if the answer matches a regex pattern.
pub struct Matches {
	pattern: Regex,
}

impl Matches {
	/// Creates a regex evaluator with the given pattern.
	pub fn new(pattern: &str) -> Result<Self> {
		Ok(Self {
			pattern: Regex::new(pattern)?,
		})
	}
}

impl Evaluator for Matches {
	fn name(&self) -> &str {
		"regex"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		score_of(self.pattern.is_match(&answer.as_text()))
	}
}

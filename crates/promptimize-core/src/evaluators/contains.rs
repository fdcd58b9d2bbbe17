use promptimize_types::Answer;

use crate::evaluator::{score_of, Evaluator};

/// Checks if the answer contains a substring.
pub struct Contains {
	substring: String,
	case_sensitive: bool,
}

impl Contains {
	/// Creates a case-sensitive contains evaluator.
	pub fn new(substring: impl Into<String>) -> Self {
		Self {
			substring: substring.into(),
			case_sensitive: true,
		}
	}

	/// Creates a case-insensitive contains evaluator.
	pub fn case_insensitive(substring: impl Into<String>) -> Self {
		Self {
			substring: substring.into(),
			case_sensitive: false,
		}
	}
}

impl Evaluator for Contains {
	fn name(&self) -> &str {
		"contains"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		let text = answer.as_text();
		let found = if self.case_sensitive {
			text.contains(&self.substring)
		} else {
			text.to_lowercase().contains(&self.substring.to_lowercase())
		};
		score_of(found)
	}
}

use promptimize_types::Answer;

use crate::evaluator::{score_of, Evaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordMode {
	/// 1 if any word is present.
	Any,
	/// 1 if every word is present.
	All,
	/// Fraction of the words that are present.
	Fraction,
}

/// Looks for a list of words in the answer text.
pub struct WordMatch {
	words: Vec<String>,
	mode: WordMode,
	case_sensitive: bool,
}

impl WordMatch {
	pub fn new<I, S>(words: I, mode: WordMode) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			words: words.into_iter().map(Into::into).collect(),
			mode,
			case_sensitive: false,
		}
	}

	pub fn any<I, S>(words: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(words, WordMode::Any)
	}

	pub fn all<I, S>(words: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(words, WordMode::All)
	}

	pub fn fraction<I, S>(words: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(words, WordMode::Fraction)
	}

	pub fn case_sensitive(mut self, yes: bool) -> Self {
		self.case_sensitive = yes;
		self
	}
}

impl Evaluator for WordMatch {
	fn name(&self) -> &str {
		match self.mode {
			WordMode::Any => "any_word",
			WordMode::All => "all_words",
			WordMode::Fraction => "percentage_of_words",
		}
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		if self.words.is_empty() {
			return 0.0;
		}
		let text = answer.as_text();
		let haystack = if self.case_sensitive {
			text.into_owned()
		} else {
			text.to_lowercase()
		};
		let found = self
			.words
			.iter()
			.filter(|w| {
				if self.case_sensitive {
					haystack.contains(w.as_str())
				} else {
					haystack.contains(&w.to_lowercase())
				}
			})
			.count();

		match self.mode {
			WordMode::Any => score_of(found > 0),
			WordMode::All => score_of(found == self.words.len()),
			WordMode::Fraction => found as f64 / self.words.len() as f64,
		}
	}
}

use std::sync::Arc;

use promptimize_types::Answer;
use serde_json::Value;

/// Scores a canonical answer. Implementations must return a value in
/// `[0, 1]`; anything else fails the prompt's test step.
pub trait Evaluator: Send + Sync {
	fn name(&self) -> &str;
	fn evaluate(&self, answer: &Answer) -> f64;
}

/// Wrap a closure over the answer text as an `Evaluator`.
pub fn from_fn<F>(f: F) -> Arc<dyn Evaluator>
where
	F: Fn(&str) -> f64 + Send + Sync + 'static,
{
	named_fn("custom", f)
}

/// Like [`from_fn`], with a name that shows up in error messages.
pub fn named_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Evaluator>
where
	F: Fn(&str) -> f64 + Send + Sync + 'static,
{
	struct TextFn<F> {
		name: String,
		f: F,
	}

	impl<F> Evaluator for TextFn<F>
	where
		F: Fn(&str) -> f64 + Send + Sync + 'static,
	{
		fn name(&self) -> &str {
			&self.name
		}

		fn evaluate(&self, answer: &Answer) -> f64 {
			(self.f)(&answer.as_text())
		}
	}

	Arc::new(TextFn { name: name.into(), f })
}

/// Wrap a closure over a structured answer. Plain-text answers score 0.
pub fn from_json_fn<F>(f: F) -> Arc<dyn Evaluator>
where
	F: Fn(&Value) -> f64 + Send + Sync + 'static,
{
	struct JsonFn<F> {
		f: F,
	}

	impl<F> Evaluator for JsonFn<F>
	where
		F: Fn(&Value) -> f64 + Send + Sync + 'static,
	{
		fn name(&self) -> &str {
			"custom_json"
		}

		fn evaluate(&self, answer: &Answer) -> f64 {
			answer.as_json().map(|v| (self.f)(v)).unwrap_or(0.0)
		}
	}

	Arc::new(JsonFn { f })
}

/// Converts a bool check into a score.
pub(crate) fn score_of(ok: bool) -> f64 {
	if ok {
		1.0
	} else {
		0.0
	}
}

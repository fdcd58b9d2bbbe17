//! Pulls JSON objects out of free-form model output.
//!
//! One pass over the text pairs every `{` with its closing `}` using a stack
//! of open braces. Quotes only open string literals inside a brace, so prose
//! quotes do not hide an object. Each balanced span is a candidate, tried in
//! order of its opening brace. Spans that fail to parse are dropped and the
//! spans nested inside them are still tried. After a successful parse the
//! spans inside it are skipped, so nested objects of a valid object are not
//! reported separately.

use serde_json::Value;

/// Deepest brace nesting a candidate span may have.
pub const MAX_DEPTH: usize = 32;

/// Every JSON object embedded in `text`, in order of appearance.
pub fn extract_json_objects(text: &str) -> Vec<Value> {
	let mut objects = Vec::new();
	let mut resume = 0;

	for (start, end) in balanced_spans(text.as_bytes()) {
		if start < resume {
			continue;
		}
		if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end]) {
			objects.push(value);
			resume = end + 1;
		}
	}

	objects
}

/// The first JSON object in `text`, or `None` when there is none.
pub fn extract_first_json(text: &str) -> Option<Value> {
	extract_json_objects(text).into_iter().next()
}

/// `(open, close)` byte offsets of every balanced brace pair no deeper than
/// [`MAX_DEPTH`], sorted by the opening brace.
fn balanced_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
	// open brace offset, deepest nesting seen inside it
	let mut open: Vec<(usize, usize)> = Vec::new();
	let mut spans = Vec::new();
	let mut in_string = false;
	let mut escaped = false;

	for (i, &b) in bytes.iter().enumerate() {
		if in_string {
			match b {
				_ if escaped => escaped = false,
				b'\\' => escaped = true,
				b'"' => in_string = false,
				_ => {}
			}
			continue;
		}
		match b {
			b'"' if !open.is_empty() => in_string = true,
			b'{' => open.push((i, 1)),
			b'}' => {
				let Some((start, depth)) = open.pop() else {
					continue;
				};
				if depth <= MAX_DEPTH {
					spans.push((start, i));
				}
				if let Some(parent) = open.last_mut() {
					parent.1 = parent.1.max(depth + 1);
				}
			}
			_ => {}
		}
	}

	spans.sort_unstable();
	spans
}

//! promptimize-types: the records, summaries and documents shared by the
//! evaluation library and the CLI.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::{Table, Tabled};
use thiserror::Error;

mod ordered;

pub use ordered::{InsertError, OrderedMap, Position};

/// The canonical answer of a prompt run: the first JSON object found in the
/// response when one was expected and present, otherwise the trimmed text.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
	Text(String),
	Structured(Value),
}

impl Answer {
	/// Text view handed to text evaluators. Structured answers are rendered
	/// as compact JSON.
	pub fn as_text(&self) -> Cow<'_, str> {
		match self {
			Answer::Text(s) => Cow::Borrowed(s),
			Answer::Structured(v) => Cow::Owned(v.to_string()),
		}
	}

	pub fn as_json(&self) -> Option<&Value> {
		match self {
			Answer::Structured(v) => Some(v),
			Answer::Text(_) => None,
		}
	}
}

/// The plain, serializable form of a prompt at report time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
	pub key: String,
	pub input: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_json: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_text: Option<String>,
	/// Raw completion text, verbose records only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response: Option<String>,
	/// Rendered prompt text, verbose records only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub test_results_avg: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub post_run_output: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pre_run_output: Option<Value>,
	/// Seconds spent in the completion call.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_call_duration: Option<f64>,
	/// Fields written by other tools or versions, kept as-is.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl PromptRecord {
	pub fn new(key: impl Into<String>, input: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			input: input.into(),
			response_json: None,
			response_text: None,
			response: None,
			prompt: None,
			test_results_avg: None,
			weight: None,
			category: None,
			post_run_output: None,
			pre_run_output: None,
			api_call_duration: None,
			extra: Map::new(),
		}
	}

	/// Stores the answer in exactly one of the two response fields.
	pub fn set_answer(&mut self, answer: &Answer) {
		match answer {
			Answer::Structured(v) => {
				self.response_json = Some(v.clone());
				self.response_text = None;
			}
			Answer::Text(s) => {
				self.response_text = Some(s.clone());
				self.response_json = None;
			}
		}
	}

	pub fn answer(&self) -> Option<Answer> {
		match (&self.response_json, &self.response_text) {
			(Some(v), _) => Some(Answer::Structured(v.clone())),
			(None, Some(s)) => Some(Answer::Text(s.clone())),
			(None, None) => None,
		}
	}

	pub fn effective_weight(&self) -> f64 {
		self.weight.unwrap_or(1.0)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptFailure {
	pub key: String,
	pub error: String,
}

/// Outcome of a suite execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
	/// Mean of the per-prompt averages; absent when nothing was scored.
	pub suite_score: Option<f64>,
	pub tested: usize,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<PromptFailure>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompts: Option<OrderedMap<PromptRecord>>,
}

/// Document flavour for records, reports and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
	#[default]
	Yaml,
	Json,
}

impl Style {
	/// Picks the style from a file extension; anything but `.json` is YAML.
	pub fn from_path(path: &std::path::Path) -> Self {
		match path.extension().and_then(|e| e.to_str()) {
			Some(ext) if ext.eq_ignore_ascii_case("json") => Style::Json,
			_ => Style::Yaml,
		}
	}
}

impl FromStr for Style {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"yaml" | "yml" => Ok(Style::Yaml),
			"json" => Ok(Style::Json),
			other => Err(format!("unknown style `{other}`, expected yaml or json")),
		}
	}
}

impl fmt::Display for Style {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Style::Yaml => f.write_str("yaml"),
			Style::Json => f.write_str("json"),
		}
	}
}

#[derive(Debug, Error)]
pub enum DocumentError {
	#[error("yaml: {0}")]
	Yaml(#[from] serde_yaml::Error),
	#[error("json: {0}")]
	Json(#[from] serde_json::Error),
}

pub fn to_document<T: Serialize>(value: &T, style: Style) -> Result<String, DocumentError> {
	match style {
		Style::Yaml => Ok(serde_yaml::to_string(value)?),
		Style::Json => {
			let mut s = serde_json::to_string_pretty(value)?;
			s.push('\n');
			Ok(s)
		}
	}
}

pub fn from_document<T: DeserializeOwned>(text: &str, style: Style) -> Result<T, DocumentError> {
	match style {
		Style::Yaml => Ok(serde_yaml::from_str(text)?),
		Style::Json => Ok(serde_json::from_str(text)?),
	}
}

#[derive(Debug, Clone, Tabled)]
struct RecordRow {
	key: String,
	category: String,
	weight: f64,
	score: String,
	duration: String,
	response: String,
}

/// Renders records as a table, one row per key, in map order.
pub fn records_table(records: &OrderedMap<PromptRecord>) -> String {
	let rows: Vec<RecordRow> = records
		.values()
		.map(|r| RecordRow {
			key: r.key.clone(),
			category: r.category.clone().unwrap_or_else(|| "-".to_string()),
			weight: r.effective_weight(),
			score: r
				.test_results_avg
				.map(|s| format!("{s:.3}"))
				.unwrap_or_else(|| "-".to_string()),
			duration: r
				.api_call_duration
				.map(|d| format!("{d:.2}s"))
				.unwrap_or_else(|| "-".to_string()),
			response: truncate(
				r.answer().map(|a| a.as_text().into_owned()).unwrap_or_default(),
				64,
			),
		})
		.collect();

	Table::new(rows).to_string()
}

fn truncate(s: String, max_len: usize) -> String {
	let s = s.replace('\n', " ");
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn sample() -> PromptRecord {
		let mut r = PromptRecord::new("prompt-1", "hello there!");
		r.set_answer(&Answer::Text("hi!\nhow are you".into()));
		r.test_results_avg = Some(0.5);
		r.weight = Some(2.0);
		r.api_call_duration = Some(0.25);
		r
	}

	#[test]
	fn test_set_answer_keeps_one_variant() {
		let mut r = sample();
		r.set_answer(&Answer::Structured(json!({"a": 1})));
		assert!(r.response_text.is_none());
		assert_eq!(r.answer(), Some(Answer::Structured(json!({"a": 1}))));
	}

	#[test]
	fn test_record_roundtrips_both_styles() {
		let mut records = OrderedMap::new();
		records.insert("prompt-1", sample());
		for style in [Style::Yaml, Style::Json] {
			let doc = to_document(&records, style).unwrap();
			let back: OrderedMap<PromptRecord> = from_document(&doc, style).unwrap();
			assert_eq!(back, records, "style {style}");
		}
	}

	#[test]
	fn test_record_field_order() {
		let doc = serde_json::to_string(&sample()).unwrap();
		let key = doc.find("\"key\"").unwrap();
		let text = doc.find("\"response_text\"").unwrap();
		let avg = doc.find("\"test_results_avg\"").unwrap();
		let duration = doc.find("\"api_call_duration\"").unwrap();
		assert!(key < text && text < avg && avg < duration);
		assert!(!doc.contains("\"prompt\""));
	}

	#[test]
	fn test_unknown_fields_survive() {
		let doc = "key: k\ninput: i\nresponse_text: t\nlegacy_score: 3\n";
		let r: PromptRecord = from_document(doc, Style::Yaml).unwrap();
		assert_eq!(r.extra.get("legacy_score"), Some(&json!(3)));
		let again = to_document(&r, Style::Yaml).unwrap();
		assert!(again.contains("legacy_score: 3"));
	}

	#[test]
	fn test_style_parsing() {
		assert_eq!("JSON".parse::<Style>(), Ok(Style::Json));
		assert_eq!("yml".parse::<Style>(), Ok(Style::Yaml));
		assert!("toml".parse::<Style>().is_err());
		assert_eq!(Style::from_path(std::path::Path::new("out.json")), Style::Json);
		assert_eq!(Style::from_path(std::path::Path::new("out.yaml")), Style::Yaml);
	}

	#[test]
	fn test_records_table_lists_keys() {
		let mut records = OrderedMap::new();
		records.insert("prompt-1", sample());
		let table = records_table(&records);
		assert!(table.contains("prompt-1"));
		assert!(table.contains("0.500"));
		assert!(table.contains("hi! how are you"));
	}
}

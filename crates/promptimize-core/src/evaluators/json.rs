use anyhow::Result;
use jsonschema::JSONSchema;
use promptimize_types::Answer;
use serde_json::Value;

use crate::evaluator::{score_of, Evaluator};
use crate::extract::extract_first_json;

fn structured(answer: &Answer) -> Option<Value> {
	match answer {
		Answer::Structured(v) => Some(v.clone()),
		Answer::Text(s) => extract_first_json(s),
	}
}

/// Scores 1 when the answer is, or contains, a JSON object.
pub struct IsJson;

impl Evaluator for IsJson {
	fn name(&self) -> &str {
		"json"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		score_of(structured(answer).is_some())
	}
}

/// Scores 1 when the answer's JSON object validates against a schema.
pub struct JsonSchema {
	schema: JSONSchema,
}

impl JsonSchema {
	/// Returns error if the schema itself is invalid.
	pub fn new(schema: &Value) -> Result<Self> {
		let compiled = JSONSchema::compile(schema)
			.map_err(|e| anyhow::anyhow!("Invalid JSON schema: {}", e))?;
		Ok(Self { schema: compiled })
	}
}

impl Evaluator for JsonSchema {
	fn name(&self) -> &str {
		"json_schema"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		match structured(answer) {
			Some(v) => score_of(self.schema.is_valid(&v)),
			None => 0.0,
		}
	}
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use promptimize_types::{from_document, Style};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::completion::ParamOverrides;
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::evaluators::{
	contains::Contains,
	exact::Equals,
	json::{IsJson, JsonSchema},
	levenshtein::Similarity,
	regex::Matches,
	sql::{SqlDialect, SqlParses},
	words::{WordMatch, WordMode},
};
use crate::prompt::Prompt;
use crate::template::{Context, ContextHook, PromptFamily, UndefinedPolicy};

/// A suite document: completion defaults, template families and prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteFile {
	#[serde(default)]
	pub completion: ParamOverrides,
	/// Families are scoped to the file that declares them.
	#[serde(default)]
	pub families: HashMap<String, FamilyConfig>,
	#[serde(default)]
	pub prompts: Vec<PromptConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
	pub template: String,
	#[serde(default)]
	pub defaults: Context,
	#[serde(default)]
	pub undefined: UndefinedPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
	pub input: String,
	#[serde(default)]
	pub key: Option<String>,
	#[serde(default)]
	pub weight: Option<f64>,
	#[serde(default)]
	pub category: Option<String>,
	#[serde(default)]
	pub expects_json: bool,
	#[serde(default)]
	pub family: Option<String>,
	#[serde(default)]
	pub template_kwargs: Context,
	#[serde(flatten)]
	pub overrides: ParamOverrides,
	#[serde(default)]
	pub evaluators: Vec<EvaluatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorConfig {
	Contains {
		substring: String,
		#[serde(default)]
		case_insensitive: bool,
	},
	AnyWord {
		words: Vec<String>,
		#[serde(default)]
		case_sensitive: bool,
	},
	AllWords {
		words: Vec<String>,
		#[serde(default)]
		case_sensitive: bool,
	},
	PercentageOfWords {
		words: Vec<String>,
		#[serde(default)]
		case_sensitive: bool,
	},
	Regex {
		pattern: String,
	},
	Levenshtein {
		expected: String,
	},
	Equals {
		expected: String,
	},
	Json,
	/// Inline `schema`, or a `path` relative to the suite file.
	JsonSchema {
		#[serde(default)]
		schema: Option<Value>,
		#[serde(default)]
		path: Option<PathBuf>,
	},
	Sql {
		#[serde(default)]
		dialect: String,
	},
}

impl EvaluatorConfig {
	pub fn build(&self, base_dir: Option<&Path>) -> Result<Arc<dyn Evaluator>> {
		let words = |words: &[String], mode, case_sensitive| {
			Arc::new(WordMatch::new(words.iter().cloned(), mode).case_sensitive(case_sensitive)) as Arc<dyn Evaluator>
		};
		let evaluator: Arc<dyn Evaluator> = match self {
			EvaluatorConfig::Contains {
				substring,
				case_insensitive,
			} => {
				if *case_insensitive {
					Arc::new(Contains::case_insensitive(substring.clone()))
				} else {
					Arc::new(Contains::new(substring.clone()))
				}
			}
			EvaluatorConfig::AnyWord { words: w, case_sensitive } => words(w, WordMode::Any, *case_sensitive),
			EvaluatorConfig::AllWords { words: w, case_sensitive } => words(w, WordMode::All, *case_sensitive),
			EvaluatorConfig::PercentageOfWords { words: w, case_sensitive } => {
				words(w, WordMode::Fraction, *case_sensitive)
			}
			EvaluatorConfig::Regex { pattern } => {
				Arc::new(Matches::new(pattern).map_err(|e| Error::Config(e.to_string()))?)
			}
			EvaluatorConfig::Levenshtein { expected } => Arc::new(Similarity::new(expected.clone())),
			EvaluatorConfig::Equals { expected } => Arc::new(Equals::new(expected.clone())),
			EvaluatorConfig::Json => Arc::new(IsJson),
			EvaluatorConfig::JsonSchema { schema, path } => {
				let schema = match (schema, path) {
					(Some(schema), None) => schema.clone(),
					(None, Some(path)) => load_schema(&resolve(base_dir, path))?,
					_ => {
						return Err(Error::Config(
							"json_schema needs exactly one of `schema` or `path`".to_string(),
						))
					}
				};
				Arc::new(JsonSchema::new(&schema).map_err(|e| Error::Config(e.to_string()))?)
			}
			EvaluatorConfig::Sql { dialect } => {
				let dialect: SqlDialect = dialect.parse().map_err(Error::Config)?;
				Arc::new(SqlParses::new(dialect))
			}
		};
		Ok(evaluator)
	}
}

fn resolve(base_dir: Option<&Path>, path: &Path) -> PathBuf {
	match base_dir {
		Some(dir) if path.is_relative() => dir.join(path),
		_ => path.to_path_buf(),
	}
}

fn load_schema(path: &Path) -> Result<Value> {
	let text = std::fs::read_to_string(path)
		.map_err(|e| Error::Config(format!("failed to read schema {:?}: {}", path, e)))?;
	Ok(from_document(&text, Style::from_path(path))?)
}

impl SuiteFile {
	pub fn parse(text: &str, style: Style) -> Result<Self> {
		Ok(from_document(text, style)?)
	}

	pub fn into_prompts(self, base_dir: Option<&Path>) -> Result<Vec<Prompt>> {
		self.into_prompts_with(base_dir, &HashMap::new())
	}

	/// Builds the file's prompts, attaching `hooks` to the families of the
	/// same name.
	pub fn into_prompts_with(
		self,
		base_dir: Option<&Path>,
		hooks: &HashMap<String, ContextHook>,
	) -> Result<Vec<Prompt>> {
		let mut families = HashMap::with_capacity(self.families.len());
		for (name, config) in self.families {
			let mut family = PromptFamily::new(name.clone(), config.template)
				.defaults(config.defaults)
				.undefined(config.undefined);
			if let Some(hook) = hooks.get(&name) {
				let hook = Arc::clone(hook);
				family = family.extra_context(move |input| hook(input));
			}
			families.insert(name, Arc::new(family));
		}

		self.prompts
			.into_iter()
			.map(|config| config.into_prompt(&families, base_dir))
			.collect()
	}
}

impl PromptConfig {
	fn into_prompt(self, families: &HashMap<String, Arc<PromptFamily>>, base_dir: Option<&Path>) -> Result<Prompt> {
		let mut prompt = match &self.family {
			Some(name) => {
				let family = families
					.get(name)
					.ok_or_else(|| Error::Config(format!("unknown template family `{name}`")))?;
				Prompt::templated(self.input, Arc::clone(family))
			}
			None if !self.template_kwargs.is_empty() => {
				return Err(Error::Config(format!(
					"prompt `{}` sets template_kwargs without a family",
					self.key.as_deref().unwrap_or(&self.input)
				)))
			}
			None => Prompt::new(self.input),
		};
		for (name, value) in self.template_kwargs {
			prompt = prompt.with_kwarg(name, value);
		}
		if let Some(key) = self.key {
			prompt = prompt.with_key(key);
		}
		if let Some(weight) = self.weight {
			prompt = prompt.with_weight(weight);
		}
		if let Some(category) = self.category {
			prompt = prompt.with_category(category);
		}
		if !self.overrides.is_empty() {
			prompt = prompt.with_overrides(self.overrides);
		}
		let evaluators = self
			.evaluators
			.iter()
			.map(|e| e.build(base_dir))
			.collect::<Result<Vec<_>>>()?;
		Ok(prompt.expecting_json(self.expects_json).with_evaluators(evaluators))
	}
}

//! promptimize-core: prompt evaluation for Rust.
//! Build prompts (raw or templated), run them against a completion API,
//! score the answers with evaluators and keep the results in a report.

pub mod completion;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod extract;
pub mod prompt;
pub mod report;
pub mod source;
pub mod suite;
pub mod template;
pub mod testing;

pub mod evaluators {
	pub mod contains;
	pub mod exact;
	pub mod json;
	pub mod levenshtein;
	pub mod regex;
	pub mod sql;
	pub mod words;
}

pub use completion::{
	from_async_fn, Completion, CompletionParams, CompletionResponse, DryRun, OpenAiCompletion,
	ParamOverrides, DRY_RUN_PLACEHOLDER,
};
pub use config::{EvaluatorConfig, SuiteFile};
pub use error::{Error, Result};
pub use evaluator::{from_fn, from_json_fn, named_fn, Evaluator};
pub use evaluators::{
	contains::Contains,
	exact::Equals,
	json::{IsJson, JsonSchema},
	levenshtein::Similarity,
	regex::Matches,
	sql::{SqlDialect, SqlParses},
	words::{WordMatch, WordMode},
};
pub use extract::{extract_first_json, extract_json_objects};
pub use prompt::{derive_key, Evaluation, Execution, Prompt, RunHooks};
pub use report::{CategorySummary, MergeMode, Report};
pub use source::{FilePromptSource, LoadedSuite, PromptSource, VecPromptSource};
pub use suite::{DuplicateKeys, ExecuteOptions, Suite, SuiteBuilder, SuiteState};
pub use template::{Context, PromptFamily, UndefinedPolicy};
pub use testing::{assert_all_tested, assert_suite_score};

pub use promptimize_types::{
	Answer, OrderedMap, Position, PromptFailure, PromptRecord, RunSummary, Style,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use promptimize_types::{Answer, PromptRecord};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::completion::{Completion, CompletionParams, ParamOverrides, TokenUsage};
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::extract::extract_first_json;
use crate::template::{self, Context, PromptFamily};

/// Optional side steps around a prompt run. Their outputs land in the
/// prompt's record.
pub trait RunHooks: Send + Sync {
	fn pre_run(&self, _input: &str) -> Option<Value> {
		None
	}

	fn post_run(&self, _input: &str, _answer: &Answer) -> Option<Value> {
		None
	}
}

/// Derived key for prompts built without one: `prompt-` and the first eight
/// hex digits of the input's SHA-256.
pub fn derive_key(input: &str) -> String {
	let digest = hex::encode(Sha256::digest(input.as_bytes()));
	format!("prompt-{}", &digest[..8])
}

#[derive(Clone)]
enum Body {
	Raw,
	Templated {
		family: Arc<PromptFamily>,
		kwargs: Context,
	},
}

/// What a run left behind.
#[derive(Debug, Clone)]
pub struct Execution {
	/// Text sent to the completion API.
	pub prompt: String,
	pub raw_response: String,
	/// Raw response with surrounding newlines removed.
	pub response_text: String,
	pub answer: Answer,
	pub api_call_duration: Duration,
	pub usage: Option<TokenUsage>,
	pub pre_run_output: Option<Value>,
	pub post_run_output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
	pub test_results: Vec<f64>,
	/// Absent when the prompt has no evaluators.
	pub test_results_avg: Option<f64>,
}

/// One request/response/scoring unit.
#[derive(Clone)]
pub struct Prompt {
	key: String,
	input: String,
	body: Body,
	evaluators: Vec<Arc<dyn Evaluator>>,
	weight: f64,
	category: Option<String>,
	expects_json: bool,
	overrides: ParamOverrides,
	hooks: Option<Arc<dyn RunHooks>>,
	execution: Option<Execution>,
	evaluation: Option<Evaluation>,
}

impl Prompt {
	pub fn new(input: impl Into<String>) -> Self {
		let input = input.into();
		Self {
			key: derive_key(&input),
			input,
			body: Body::Raw,
			evaluators: Vec::new(),
			weight: 1.0,
			category: None,
			expects_json: false,
			overrides: ParamOverrides::default(),
			hooks: None,
			execution: None,
			evaluation: None,
		}
	}

	/// A prompt whose body is rendered from `family`'s template.
	pub fn templated(input: impl Into<String>, family: Arc<PromptFamily>) -> Self {
		let mut prompt = Self::new(input);
		prompt.body = Body::Templated {
			family,
			kwargs: Context::new(),
		};
		prompt
	}

	pub fn with_key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();
		self
	}

	pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
		self.evaluators.push(evaluator);
		self
	}

	pub fn with_evaluators<I>(mut self, evaluators: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn Evaluator>>,
	{
		self.evaluators = evaluators.into_iter().collect();
		self
	}

	/// Zero, negative and non-finite weights fall back to 1.
	pub fn with_weight(mut self, weight: f64) -> Self {
		self.weight = if weight.is_finite() && weight > 0.0 { weight } else { 1.0 };
		self
	}

	pub fn with_category(mut self, category: impl Into<String>) -> Self {
		self.category = Some(category.into());
		self
	}

	/// Use the first JSON object in the response as the answer.
	pub fn expecting_json(mut self, yes: bool) -> Self {
		self.expects_json = yes;
		self
	}

	pub fn with_overrides(mut self, overrides: ParamOverrides) -> Self {
		self.overrides = overrides;
		self
	}

	pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
		self.hooks = Some(hooks);
		self
	}

	/// Sets a template variable. No-op on prompts without a template.
	pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		if let Body::Templated { kwargs, .. } = &mut self.body {
			kwargs.insert(name.into(), value.into());
		}
		self
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn input(&self) -> &str {
		&self.input
	}

	pub fn family(&self) -> Option<&PromptFamily> {
		match &self.body {
			Body::Templated { family, .. } => Some(family),
			Body::Raw => None,
		}
	}

	pub fn evaluator_count(&self) -> usize {
		self.evaluators.len()
	}

	pub fn weight(&self) -> f64 {
		self.weight
	}

	pub fn category(&self) -> Option<&str> {
		self.category.as_deref()
	}

	pub fn has_run(&self) -> bool {
		self.execution.is_some()
	}

	pub fn was_tested(&self) -> bool {
		self.evaluation.is_some()
	}

	pub fn execution(&self) -> Option<&Execution> {
		self.execution.as_ref()
	}

	pub fn evaluation(&self) -> Option<&Evaluation> {
		self.evaluation.as_ref()
	}

	pub fn answer(&self) -> Option<&Answer> {
		self.execution.as_ref().map(|e| &e.answer)
	}

	pub fn test_results_avg(&self) -> Option<f64> {
		self.evaluation.as_ref().and_then(|e| e.test_results_avg)
	}

	/// Merged template context, `None` for raw prompts.
	pub fn template_context(&self) -> Option<Context> {
		match &self.body {
			Body::Templated { family, kwargs } => Some(family.context(&self.input, kwargs)),
			Body::Raw => None,
		}
	}

	/// The text that will be sent to the completion API. Does not mutate.
	pub fn render(&self) -> Result<String> {
		match &self.body {
			Body::Raw => Ok(self.input.clone()),
			Body::Templated { family, kwargs } => {
				let ctx = family.context(&self.input, kwargs);
				template::render(family.template(), &ctx, family.policy()).map_err(|variable| Error::Template {
					key: self.key.clone(),
					variable,
				})
			}
		}
	}

	/// Renders, calls the completion API once and records the outcome.
	/// Calling it again replaces the previous execution and clears any test
	/// results.
	pub async fn run(&mut self, completion: &dyn Completion, params: &CompletionParams) -> Result<&Answer> {
		let pre_run_output = self.hooks.as_ref().and_then(|h| h.pre_run(&self.input));
		let prompt = self.render()?;
		let params = params.with_overrides(&self.overrides);

		debug!(key = %self.key, model = %params.model, "calling completion API");
		let started = Instant::now();
		let response = completion
			.complete(&prompt, &params)
			.await
			.map_err(|e| Error::ExternalCall {
				key: self.key.clone(),
				source: e.into(),
			})?;
		let api_call_duration = started.elapsed();

		let raw_response = response
			.first_text()
			.ok_or_else(|| Error::ExternalCall {
				key: self.key.clone(),
				source: "completion response has no choices".into(),
			})?
			.to_string();
		let response_text = raw_response.trim_matches('\n').to_string();

		let structured = if self.expects_json {
			extract_first_json(&raw_response)
		} else {
			None
		};
		let answer = match structured {
			Some(v) => Answer::Structured(v),
			None => Answer::Text(response_text.clone()),
		};
		let post_run_output = self.hooks.as_ref().and_then(|h| h.post_run(&self.input, &answer));
		debug!(key = %self.key, elapsed_ms = api_call_duration.as_millis() as u64, "completion received");

		self.evaluation = None;
		let execution = self.execution.insert(Execution {
			prompt,
			raw_response,
			response_text,
			answer,
			api_call_duration,
			usage: response.usage,
			pre_run_output,
			post_run_output,
		});
		Ok(&execution.answer)
	}

	/// Scores the answer with every evaluator, in order.
	pub fn test(&mut self) -> Result<&Evaluation> {
		let answer = match &self.execution {
			Some(execution) => &execution.answer,
			None => return Err(Error::NotRun { key: self.key.clone() }),
		};

		let mut test_results = Vec::with_capacity(self.evaluators.len());
		for evaluator in &self.evaluators {
			let value = evaluator.evaluate(answer);
			if !value.is_finite() || !(0.0..=1.0).contains(&value) {
				return Err(Error::EvaluationRange {
					key: self.key.clone(),
					evaluator: evaluator.name().to_string(),
					value,
				});
			}
			test_results.push(value);
		}

		let test_results_avg = if test_results.is_empty() {
			None
		} else {
			Some(test_results.iter().sum::<f64>() / test_results.len() as f64)
		};
		debug!(key = %self.key, avg = ?test_results_avg, "tested");

		Ok(self.evaluation.insert(Evaluation {
			test_results,
			test_results_avg,
		}))
	}

	/// Plain record of the prompt's current state. `verbose` adds the
	/// rendered prompt and raw response.
	pub fn to_record(&self, verbose: bool) -> PromptRecord {
		let mut record = PromptRecord::new(&self.key, &self.input);
		if let Some(execution) = &self.execution {
			record.set_answer(&execution.answer);
			if verbose {
				record.response = Some(execution.raw_response.clone());
				record.prompt = Some(execution.prompt.clone());
			}
			record.post_run_output = execution.post_run_output.clone();
			record.pre_run_output = execution.pre_run_output.clone();
			record.api_call_duration = Some(execution.api_call_duration.as_secs_f64());
		}
		if let Some(evaluation) = &self.evaluation {
			record.test_results_avg = evaluation.test_results_avg;
		}
		if self.weight != 1.0 {
			record.weight = Some(self.weight);
		}
		record.category = self.category.clone();
		record
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::completion::{from_async_fn, DryRun, DRY_RUN_PLACEHOLDER};
	use crate::evaluator::{from_fn, named_fn};
	use serde_json::json;

	fn canned(text: &'static str) -> Arc<dyn Completion> {
		from_async_fn(move |_, _| async move { Ok(text.to_string()) })
	}

	#[test]
	fn test_derived_key_is_stable() {
		let a = Prompt::new("hello there!");
		let b = Prompt::new("hello there!");
		let c = Prompt::new("hello there?");
		assert_eq!(a.key(), b.key());
		assert_ne!(a.key(), c.key());
		assert!(a.key().starts_with("prompt-"));
		assert_eq!(a.key().len(), "prompt-".len() + 8);
		assert_eq!(Prompt::new("x").with_key("mine").key(), "mine");
	}

	#[test]
	fn test_render_is_identity_and_pure() {
		let p = Prompt::new("hello there!");
		assert_eq!(p.render().unwrap(), "hello there!");
		assert_eq!(p.render().unwrap(), p.render().unwrap());
		assert!(!p.has_run());
	}

	#[test]
	fn test_templated_render_layers() {
		let family = Arc::new(
			PromptFamily::new("sql", "{{ x }} / {{ dialect }} / {{ input }}")
				.default_var("x", "a")
				.default_var("dialect", "Postgres")
				.extra_context(|_| {
					let mut c = Context::new();
					c.insert("x".into(), json!("b"));
					c
				}),
		);
		let p = family.prompt("top 10").with_kwarg("x", "c");
		assert_eq!(p.render().unwrap(), "c / Postgres / top 10");

		let q = family.prompt("top 10").with_kwarg("dialect", "BigQuery");
		assert_eq!(q.render().unwrap(), "b / BigQuery / top 10");
		// sibling prompts do not share kwargs
		assert_eq!(p.render().unwrap(), "c / Postgres / top 10");
	}

	#[test]
	fn test_templated_render_missing_variable() {
		let family = Arc::new(PromptFamily::new("f", "hi {{ name }}"));
		let p = family.prompt("x").with_key("k");
		match p.render() {
			Err(Error::Template { key, variable }) => {
				assert_eq!(key, "k");
				assert_eq!(variable, "name");
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_run_trims_newlines() {
		let mut p = Prompt::new("hello");
		let answer = p.run(canned("\n\nHi there!\n").as_ref(), &CompletionParams::default()).await.unwrap();
		assert_eq!(answer, &Answer::Text("Hi there!".into()));
		let execution = p.execution().unwrap();
		assert_eq!(execution.raw_response, "\n\nHi there!\n");
		assert_eq!(execution.prompt, "hello");
		assert!(p.has_run());
		assert!(!p.was_tested());
	}

	#[tokio::test]
	async fn test_run_extracts_json_when_expected() {
		let completion = canned("Sure! {\"answer\": 42} hope that helps");
		let mut p = Prompt::new("q").expecting_json(true);
		let answer = p.run(completion.as_ref(), &CompletionParams::default()).await.unwrap();
		assert_eq!(answer, &Answer::Structured(json!({"answer": 42})));

		let record = p.to_record(false);
		assert_eq!(record.response_json, Some(json!({"answer": 42})));
		assert!(record.response_text.is_none());

		// without the flag the text stays canonical
		let mut plain = Prompt::new("q");
		plain.run(completion.as_ref(), &CompletionParams::default()).await.unwrap();
		assert!(matches!(plain.answer(), Some(Answer::Text(_))));
	}

	#[tokio::test]
	async fn test_run_falls_back_to_text_without_json() {
		let mut p = Prompt::new("q").expecting_json(true);
		let answer = p.run(canned("no braces").as_ref(), &CompletionParams::default()).await.unwrap();
		assert_eq!(answer, &Answer::Text("no braces".into()));
	}

	#[tokio::test]
	async fn test_run_applies_overrides() {
		let echo = from_async_fn(|_, params| async move { Ok(params.model) });
		let mut p = Prompt::new("q").with_overrides(ParamOverrides {
			model: Some("special".into()),
			..Default::default()
		});
		p.run(echo.as_ref(), &CompletionParams::default()).await.unwrap();
		assert_eq!(p.answer(), Some(&Answer::Text("special".into())));
	}

	#[tokio::test]
	async fn test_run_propagates_external_errors() {
		let failing = from_async_fn(|_, _| async move { Err(anyhow::anyhow!("rate limited")) });
		let mut p = Prompt::new("q").with_key("k");
		let err = p.run(failing.as_ref(), &CompletionParams::default()).await.unwrap_err();
		assert!(matches!(err, Error::ExternalCall { ref key, .. } if key == "k"));
		assert!(err.to_string().contains("rate limited"));
		assert!(!p.has_run());
	}

	#[test]
	fn test_test_before_run_fails() {
		let mut p = Prompt::new("q").with_key("k");
		assert!(matches!(p.test(), Err(Error::NotRun { key }) if key == "k"));
	}

	#[tokio::test]
	async fn test_scores_are_averaged() {
		let mut p = Prompt::new("q")
			.with_evaluator(from_fn(|_| 0.0))
			.with_evaluator(from_fn(|_| 1.0))
			.with_evaluator(from_fn(|_| 0.5));
		p.run(&DryRun, &CompletionParams::default()).await.unwrap();
		let evaluation = p.test().unwrap();
		assert_eq!(evaluation.test_results, vec![0.0, 1.0, 0.5]);
		assert_eq!(evaluation.test_results_avg, Some(0.5));
		assert!(p.was_tested());
	}

	#[tokio::test]
	async fn test_out_of_range_scores_fail() {
		for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
			let mut p = Prompt::new("q").with_evaluator(named_fn("bad", move |_| bad));
			p.run(&DryRun, &CompletionParams::default()).await.unwrap();
			match p.test() {
				Err(Error::EvaluationRange { evaluator, .. }) => assert_eq!(evaluator, "bad"),
				other => panic!("expected range error for {bad}, got {other:?}"),
			}
			assert!(!p.was_tested());
		}
	}

	#[tokio::test]
	async fn test_no_evaluators_leaves_average_absent() {
		let mut p = Prompt::new("q");
		p.run(&DryRun, &CompletionParams::default()).await.unwrap();
		assert_eq!(p.test().unwrap().test_results_avg, None);
		assert!(p.was_tested());
		assert!(p.to_record(false).test_results_avg.is_none());
	}

	#[tokio::test]
	async fn test_record_fields() {
		struct Tag;
		impl RunHooks for Tag {
			fn pre_run(&self, input: &str) -> Option<Value> {
				Some(json!({"len": input.len()}))
			}
		}

		let mut p = Prompt::new("hello").with_weight(2.0).with_category("greetings").with_hooks(Arc::new(Tag));
		let fresh = p.to_record(false);
		assert!(fresh.response_text.is_none());
		assert!(fresh.api_call_duration.is_none());

		p.run(&DryRun, &CompletionParams::default()).await.unwrap();
		p.test().unwrap();
		let record = p.to_record(false);
		assert_eq!(record.response_text.as_deref(), Some(DRY_RUN_PLACEHOLDER));
		assert_eq!(record.weight, Some(2.0));
		assert_eq!(record.category.as_deref(), Some("greetings"));
		assert_eq!(record.pre_run_output, Some(json!({"len": 5})));
		assert!(record.post_run_output.is_none());
		assert!(record.api_call_duration.is_some());
		assert!(record.prompt.is_none());

		let verbose = p.to_record(true);
		assert_eq!(verbose.prompt.as_deref(), Some("hello"));
		assert_eq!(verbose.response.as_deref(), Some(DRY_RUN_PLACEHOLDER));
	}

	#[tokio::test]
	async fn test_rerun_clears_test_results() {
		let mut p = Prompt::new("q").with_evaluator(from_fn(|_| 1.0));
		p.run(&DryRun, &CompletionParams::default()).await.unwrap();
		p.test().unwrap();
		p.run(&DryRun, &CompletionParams::default()).await.unwrap();
		assert!(p.has_run());
		assert!(!p.was_tested());
	}
}

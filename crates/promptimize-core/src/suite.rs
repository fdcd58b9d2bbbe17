use std::io::Write;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use promptimize_types::{to_document, OrderedMap, PromptFailure, PromptRecord, RunSummary, Style};
use tracing::{info, warn};

use crate::completion::{Completion, CompletionParams, DryRun};
use crate::error::{Error, Result};
use crate::prompt::Prompt;

const SEPARATOR: &str = "#----------------------------------------";

/// How the builder treats two prompts with the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateKeys {
	/// Fail the build with [`Error::DuplicateKey`].
	#[default]
	Reject,
	/// Keep the first prompt's position and the last prompt's value.
	LastWriteWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
	Constructed,
	Executing,
	Completed,
	/// A prompt failed and execution stopped early.
	Aborted,
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
	/// Skip the completion API and answer with a fixed placeholder.
	pub dry_run: bool,
	/// Do not print per-prompt records. The summary is still printed.
	pub silent: bool,
	/// Include rendered prompts and raw responses in records, and the
	/// records themselves in the summary.
	pub verbose: bool,
	pub style: Style,
	/// Run only these keys.
	pub keys: Option<Vec<String>>,
	/// Record failing prompts in the summary instead of aborting.
	pub continue_on_error: bool,
	/// Completion calls in flight at once. Records are still printed and
	/// aggregated in suite order.
	pub concurrency: usize,
}

impl Default for ExecuteOptions {
	fn default() -> Self {
		Self {
			dry_run: false,
			silent: false,
			verbose: false,
			style: Style::Yaml,
			keys: None,
			continue_on_error: false,
			concurrency: 1,
		}
	}
}

pub struct SuiteBuilder {
	prompts: Vec<Prompt>,
	params: CompletionParams,
	completion: Option<Arc<dyn Completion>>,
	duplicates: DuplicateKeys,
}

impl SuiteBuilder {
	pub fn new() -> Self {
		Self {
			prompts: Vec::new(),
			params: CompletionParams::default(),
			completion: None,
			duplicates: DuplicateKeys::default(),
		}
	}

	pub fn prompts<I>(mut self, prompts: I) -> Self
	where
		I: IntoIterator<Item = Prompt>,
	{
		self.prompts.extend(prompts);
		self
	}

	pub fn add_prompt(mut self, prompt: Prompt) -> Self {
		self.prompts.push(prompt);
		self
	}

	pub fn params(mut self, params: CompletionParams) -> Self {
		self.params = params;
		self
	}

	pub fn completion(mut self, completion: Arc<dyn Completion>) -> Self {
		self.completion = Some(completion);
		self
	}

	pub fn duplicate_keys(mut self, policy: DuplicateKeys) -> Self {
		self.duplicates = policy;
		self
	}

	pub fn build(self) -> Result<Suite> {
		let mut prompts = OrderedMap::new();
		for prompt in self.prompts {
			let key = prompt.key().to_string();
			if self.duplicates == DuplicateKeys::Reject && prompts.contains_key(&key) {
				return Err(Error::DuplicateKey(key));
			}
			prompts.insert(key, prompt);
		}
		Ok(Suite {
			prompts,
			params: self.params,
			completion: self.completion,
			state: SuiteState::Constructed,
		})
	}
}

impl Default for SuiteBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// An ordered, keyed collection of prompts executed and scored together.
pub struct Suite {
	prompts: OrderedMap<Prompt>,
	params: CompletionParams,
	completion: Option<Arc<dyn Completion>>,
	state: SuiteState,
}

impl Suite {
	pub fn builder() -> SuiteBuilder {
		SuiteBuilder::new()
	}

	pub fn prompts(&self) -> &OrderedMap<Prompt> {
		&self.prompts
	}

	pub fn get(&self, key: &str) -> Option<&Prompt> {
		self.prompts.get(key)
	}

	pub fn params(&self) -> &CompletionParams {
		&self.params
	}

	pub fn state(&self) -> SuiteState {
		self.state
	}

	/// Mean of the per-prompt averages over tested prompts. Prompts without
	/// evaluators have no average and are left out.
	pub fn suite_score(&self) -> Option<f64> {
		let scores: Vec<f64> = self.prompts.values().filter_map(Prompt::test_results_avg).collect();
		if scores.is_empty() {
			None
		} else {
			Some(scores.iter().sum::<f64>() / scores.len() as f64)
		}
	}

	/// Records of every prompt that has run, in suite order.
	pub fn records(&self, verbose: bool) -> OrderedMap<PromptRecord> {
		self.prompts
			.iter()
			.filter(|(_, p)| p.has_run())
			.map(|(k, p)| (k.to_string(), p.to_record(verbose)))
			.collect()
	}

	pub fn run_summary(&self, verbose: bool) -> RunSummary {
		RunSummary {
			suite_score: self.suite_score(),
			tested: self.prompts.values().filter(|p| p.was_tested()).count(),
			failures: Vec::new(),
			prompts: verbose.then(|| self.records(true)),
		}
	}

	/// Runs and tests every selected prompt, printing to stdout.
	pub async fn execute(&mut self, opts: &ExecuteOptions) -> Result<RunSummary> {
		let mut stdout = std::io::stdout();
		self.execute_to(&mut stdout, opts).await
	}

	/// Runs and tests every selected prompt in suite order, writing each
	/// record and then the run summary to `out`.
	///
	/// Unless `continue_on_error` is set, the first failing prompt aborts
	/// the run and its error is returned.
	pub async fn execute_to<W: Write>(&mut self, out: &mut W, opts: &ExecuteOptions) -> Result<RunSummary> {
		let completion: Arc<dyn Completion> = if opts.dry_run {
			Arc::new(DryRun)
		} else {
			self.completion.clone().ok_or_else(|| {
				Error::Config("no completion client configured, set one or use a dry run".to_string())
			})?
		};
		if let Some(keys) = &opts.keys {
			if let Some(unknown) = keys.iter().find(|k| !self.prompts.contains_key(k)) {
				return Err(Error::Config(format!("unknown prompt key `{unknown}`")));
			}
		}

		self.state = SuiteState::Executing;
		info!(prompts = self.prompts.len(), dry_run = opts.dry_run, model = %self.params.model, "executing suite");

		let completion = completion.as_ref();
		let params = &self.params;
		let selected = self
			.prompts
			.values_mut()
			.filter(|p| opts.keys.as_ref().map_or(true, |keys| keys.iter().any(|k| k == p.key())));
		// Each prompt runs on a copy that is committed back in suite order, so
		// an abort leaves every later prompt exactly as a sequential run would.
		let mut outcomes = stream::iter(selected)
			.map(move |prompt| async move {
				let mut work = prompt.clone();
				let ran = work.run(completion, params).await.map(|_| ());
				let result = ran.and_then(|()| work.test().map(|_| ()));
				(prompt, work, result)
			})
			.buffered(opts.concurrency.max(1));

		let mut failures = Vec::new();
		while let Some((prompt, work, result)) = outcomes.next().await {
			*prompt = work;
			match result {
				Ok(()) => {
					if !opts.silent {
						let record = prompt.to_record(opts.verbose);
						write!(out, "{}", to_document(&record, opts.style)?)?;
						writeln!(out, "{SEPARATOR}")?;
					}
				}
				Err(err) if opts.continue_on_error => {
					warn!(key = %prompt.key(), error = %err, "prompt failed, continuing");
					failures.push(PromptFailure {
						key: prompt.key().to_string(),
						error: err.to_string(),
					});
				}
				Err(err) => {
					self.state = SuiteState::Aborted;
					return Err(err);
				}
			}
		}
		drop(outcomes);

		self.state = SuiteState::Completed;
		let mut summary = self.run_summary(opts.verbose);
		summary.failures = failures;
		write!(out, "{}", to_document(&summary, opts.style)?)?;
		info!(suite_score = ?summary.suite_score, tested = summary.tested, failures = summary.failures.len(), "suite completed");
		Ok(summary)
	}
}

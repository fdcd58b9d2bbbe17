use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Text recorded as the answer of every prompt in a dry run.
pub const DRY_RUN_PLACEHOLDER: &str = "(dry run) no completion requested";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
	pub model: String,
	pub max_tokens: u32,
	pub temperature: f32,
}

impl Default for CompletionParams {
	fn default() -> Self {
		Self {
			model: DEFAULT_MODEL.to_string(),
			max_tokens: DEFAULT_MAX_TOKENS,
			temperature: DEFAULT_TEMPERATURE,
		}
	}
}

impl CompletionParams {
	/// These parameters with any set override applied.
	pub fn with_overrides(&self, overrides: &ParamOverrides) -> Self {
		Self {
			model: overrides.model.clone().unwrap_or_else(|| self.model.clone()),
			max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
			temperature: overrides.temperature.unwrap_or(self.temperature),
		}
	}
}

/// Per-prompt replacements for suite-wide completion parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverrides {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
}

impl ParamOverrides {
	pub fn is_empty(&self) -> bool {
		self.model.is_none() && self.max_tokens.is_none() && self.temperature.is_none()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
	pub prompt_tokens: u32,
	#[serde(default)]
	pub completion_tokens: u32,
	pub total_tokens: u32,
}

/// Shape of a text-completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
	pub choices: Vec<Choice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
	pub fn from_text(text: impl Into<String>) -> Self {
		Self {
			choices: vec![Choice { text: text.into() }],
			usage: None,
		}
	}

	pub fn first_text(&self) -> Option<&str> {
		self.choices.first().map(|c| c.text.as_str())
	}
}

/// The completion API boundary: one fallible, possibly slow call.
#[async_trait]
pub trait Completion: Send + Sync {
	async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<CompletionResponse>;
}

/// Wrap an async closure returning completion text as a `Completion`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Completion>
where
	F: Send + Sync + 'static + Fn(String, CompletionParams) -> Fut,
	Fut: Future<Output = Result<String>> + Send + 'static,
{
	struct ClosureCompletion<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Completion for ClosureCompletion<F>
	where
		F: Send + Sync + 'static + Fn(String, CompletionParams) -> Fut,
		Fut: Future<Output = Result<String>> + Send + 'static,
	{
		async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<CompletionResponse> {
			let text = (self.f)(prompt.to_string(), params.clone()).await?;
			Ok(CompletionResponse::from_text(text))
		}
	}

	Arc::new(ClosureCompletion { f })
}

/// Answers every prompt with [`DRY_RUN_PLACEHOLDER`] without leaving the
/// process.
pub struct DryRun;

#[async_trait]
impl Completion for DryRun {
	async fn complete(&self, _prompt: &str, _params: &CompletionParams) -> Result<CompletionResponse> {
		Ok(CompletionResponse::from_text(DRY_RUN_PLACEHOLDER))
	}
}

/// Client for an OpenAI-compatible `/completions` endpoint.
pub struct OpenAiCompletion {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl OpenAiCompletion {
	pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

	pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Option<Duration>) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}
		Ok(Self {
			client: builder.build().context("failed to build HTTP client")?,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
		})
	}

	/// Reads `OPENAI_BASE_URL` and `OPENAI_API_KEY`.
	pub fn from_env(timeout: Option<Duration>) -> Result<Self> {
		let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string());
		let api_key = std::env::var("OPENAI_API_KEY").ok();
		Self::new(base_url, api_key, timeout)
	}
}

#[async_trait]
impl Completion for OpenAiCompletion {
	async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<CompletionResponse> {
		let url = format!("{}/completions", self.base_url);
		let mut req = self.client.post(&url).json(&serde_json::json!({
			"model": params.model,
			"prompt": prompt,
			"max_tokens": params.max_tokens,
			"temperature": params.temperature,
		}));
		if let Some(key) = &self.api_key {
			req = req.bearer_auth(key);
		}

		let resp = req.send().await.with_context(|| format!("POST {url}"))?;
		let status = resp.status();
		if !status.is_success() {
			let body = resp.text().await.unwrap_or_default();
			anyhow::bail!("HTTP {}: {}", status.as_u16(), body);
		}
		let parsed = resp
			.json::<CompletionResponse>()
			.await
			.context("unexpected completion response shape")?;
		Ok(parsed)
	}
}

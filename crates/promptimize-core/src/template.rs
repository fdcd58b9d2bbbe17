//! `{{ name }}` templates and the prompt families that own them.

use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prompt::Prompt;

/// Render-time variables.
pub type Context = Map<String, Value>;

/// Name under which a prompt's raw input is exposed to its template. It
/// always wins over context layers.
pub const INPUT_VAR: &str = "input";

/// What to do with a `{{ name }}` that no context layer defines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedPolicy {
	/// Fail the render.
	#[default]
	Strict,
	/// Substitute an empty string.
	Empty,
}

fn placeholder() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
	})
}

/// Substitutes every `{{ name }}` in `template` from `context`. Strings are
/// inserted verbatim, other values as compact JSON. On failure returns the
/// first undefined variable name.
pub fn render(template: &str, context: &Context, policy: UndefinedPolicy) -> Result<String, String> {
	let mut missing = None;
	let out = placeholder().replace_all(template, |caps: &Captures| {
		let name = &caps[1];
		match context.get(name) {
			Some(Value::String(s)) => s.clone(),
			Some(Value::Null) => String::new(),
			Some(other) => other.to_string(),
			None => {
				if policy == UndefinedPolicy::Strict && missing.is_none() {
					missing = Some(name.to_string());
				}
				String::new()
			}
		}
	});
	match missing {
		Some(name) => Err(name),
		None => Ok(out.into_owned()),
	}
}

/// Computes extra template context from a prompt's input.
pub type ContextHook = Arc<dyn Fn(&str) -> Context + Send + Sync>;

/// A family of templated prompts: one template, its default variables and
/// an optional hook contributing computed context.
///
/// Each prompt resolves its context from a copy of these layers, so no
/// instance can alter what its siblings see.
#[derive(Clone)]
pub struct PromptFamily {
	name: String,
	template: String,
	defaults: Context,
	extra_context: Option<ContextHook>,
	policy: UndefinedPolicy,
}

impl PromptFamily {
	pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			template: template.into(),
			defaults: Context::new(),
			extra_context: None,
			policy: UndefinedPolicy::default(),
		}
	}

	pub fn default_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.defaults.insert(name.into(), value.into());
		self
	}

	pub fn defaults(mut self, defaults: Context) -> Self {
		self.defaults = defaults;
		self
	}

	pub fn extra_context<F>(mut self, hook: F) -> Self
	where
		F: Fn(&str) -> Context + Send + Sync + 'static,
	{
		self.extra_context = Some(Arc::new(hook));
		self
	}

	pub fn undefined(mut self, policy: UndefinedPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn template(&self) -> &str {
		&self.template
	}

	pub fn policy(&self) -> UndefinedPolicy {
		self.policy
	}

	/// Merged context for one instance: defaults, then the extra-context
	/// hook, then `kwargs`; later layers win. `input` is set last.
	pub fn context(&self, input: &str, kwargs: &Context) -> Context {
		let mut ctx = self.defaults.clone();
		if let Some(hook) = &self.extra_context {
			ctx.extend(hook(input));
		}
		ctx.extend(kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
		ctx.insert(INPUT_VAR.to_string(), Value::String(input.to_string()));
		ctx
	}

	/// Starts a templated prompt of this family.
	pub fn prompt(self: &Arc<Self>, input: impl Into<String>) -> Prompt {
		Prompt::templated(input, Arc::clone(self))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn ctx(pairs: &[(&str, Value)]) -> Context {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn test_render_substitutes() {
		let c = ctx(&[("dialect", json!("BigQuery")), ("n", json!(10))]);
		let out = render("top {{n}} in {{ dialect }}", &c, UndefinedPolicy::Strict).unwrap();
		assert_eq!(out, "top 10 in BigQuery");
	}

	#[test]
	fn test_render_undefined_policies() {
		let c = Context::new();
		assert_eq!(
			render("a {{ x }} b {{ y }}", &c, UndefinedPolicy::Strict),
			Err("x".to_string())
		);
		assert_eq!(
			render("a {{ x }} b", &c, UndefinedPolicy::Empty),
			Ok("a  b".to_string())
		);
	}

	#[test]
	fn test_render_leaves_json_braces_alone() {
		let out = render(r#"reply as {"answer": "{{ x }}"}"#, &ctx(&[("x", json!("ok"))]), UndefinedPolicy::Strict);
		assert_eq!(out.unwrap(), r#"reply as {"answer": "ok"}"#);
	}

	#[test]
	fn test_context_layer_order() {
		let family = PromptFamily::new("f", "{{ x }}")
			.default_var("x", "a")
			.default_var("only_default", "d")
			.extra_context(|_| ctx(&[("x", json!("b")), ("only_extra", json!("e"))]));

		let merged = family.context("in", &ctx(&[("x", json!("c"))]));
		assert_eq!(merged["x"], json!("c"));
		assert_eq!(merged["only_default"], json!("d"));
		assert_eq!(merged["only_extra"], json!("e"));

		let no_kwargs = family.context("in", &Context::new());
		assert_eq!(no_kwargs["x"], json!("b"));
	}

	#[test]
	fn test_input_is_reserved() {
		let family = PromptFamily::new("f", "{{ input }}").default_var("input", "shadowed");
		let merged = family.context("real", &ctx(&[("input", json!("also shadowed"))]));
		assert_eq!(merged[INPUT_VAR], json!("real"));
	}
}

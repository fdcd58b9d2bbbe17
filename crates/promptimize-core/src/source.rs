use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use promptimize_types::Style;
use tracing::debug;

use crate::completion::ParamOverrides;
use crate::config::SuiteFile;
use crate::prompt::Prompt;
use crate::template::{Context, ContextHook};

const SUITE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[async_trait]
pub trait PromptSource: Send + Sync {
	async fn load(&self) -> Result<Vec<Prompt>>;
}

pub struct VecPromptSource {
	prompts: Vec<Prompt>,
}

impl VecPromptSource {
	pub fn new(prompts: Vec<Prompt>) -> Self {
		Self { prompts }
	}
}

#[async_trait]
impl PromptSource for VecPromptSource {
	async fn load(&self) -> Result<Vec<Prompt>> {
		Ok(self.prompts.clone())
	}
}

/// Prompts and completion defaults read from suite files.
#[derive(Clone, Default)]
pub struct LoadedSuite {
	/// Completion defaults, later files overriding earlier ones per field.
	pub completion: ParamOverrides,
	pub prompts: Vec<Prompt>,
}

/// Reads a single suite file, or every `.yaml`, `.yml` and `.json` file of
/// a directory in file-name order.
pub struct FilePromptSource {
	path: PathBuf,
	hooks: HashMap<String, ContextHook>,
}

impl FilePromptSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			hooks: HashMap::new(),
		}
	}

	/// Computed context for every family named `family`.
	pub fn with_context<F>(mut self, family: impl Into<String>, hook: F) -> Self
	where
		F: Fn(&str) -> Context + Send + Sync + 'static,
	{
		self.hooks.insert(family.into(), Arc::new(hook));
		self
	}

	pub async fn files(&self) -> Result<Vec<PathBuf>> {
		let meta = tokio::fs::metadata(&self.path)
			.await
			.with_context(|| format!("Failed to read {:?}", self.path))?;
		if !meta.is_dir() {
			return Ok(vec![self.path.clone()]);
		}

		let mut files = Vec::new();
		let mut entries = tokio::fs::read_dir(&self.path)
			.await
			.with_context(|| format!("Failed to list {:?}", self.path))?;
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let is_suite = path
				.extension()
				.and_then(|e| e.to_str())
				.is_some_and(|e| SUITE_EXTENSIONS.contains(&e));
			if is_suite && entry.file_type().await?.is_file() {
				files.push(path);
			}
		}
		files.sort();
		Ok(files)
	}

	pub async fn load_suite(&self) -> Result<LoadedSuite> {
		let mut loaded = LoadedSuite::default();
		for path in self.files().await? {
			let text = tokio::fs::read_to_string(&path)
				.await
				.with_context(|| format!("Failed to read {:?}", path))?;
			let file = SuiteFile::parse(&text, Style::from_path(&path))
				.with_context(|| format!("Invalid suite file {:?}", path))?;
			let completion = file.completion.clone();
			let prompts = file
				.into_prompts_with(path.parent(), &self.hooks)
				.with_context(|| format!("Invalid suite file {:?}", path))?;
			debug!(?path, prompts = prompts.len(), "loaded suite file");

			loaded.completion = ParamOverrides {
				model: completion.model.or(loaded.completion.model),
				max_tokens: completion.max_tokens.or(loaded.completion.max_tokens),
				temperature: completion.temperature.or(loaded.completion.temperature),
			};
			loaded.prompts.extend(prompts);
		}
		Ok(loaded)
	}
}

#[async_trait]
impl PromptSource for FilePromptSource {
	async fn load(&self) -> Result<Vec<Prompt>> {
		Ok(self.load_suite().await?.prompts)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_directory_is_read_in_name_order() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(
			dir.path().join("b.json"),
			r#"{"completion": {"model": "later"}, "prompts": [{"input": "from b", "key": "b"}]}"#,
		)
		.await
		.unwrap();
		tokio::fs::write(
			dir.path().join("a.yaml"),
			"completion:\n  model: first\n  max_tokens: 10\nprompts:\n  - input: from a\n    key: a\n",
		)
		.await
		.unwrap();
		tokio::fs::write(dir.path().join("notes.txt"), "ignored").await.unwrap();

		let loaded = FilePromptSource::new(dir.path()).load_suite().await.unwrap();
		let keys: Vec<&str> = loaded.prompts.iter().map(Prompt::key).collect();
		assert_eq!(keys, vec!["a", "b"]);
		assert_eq!(loaded.completion.model.as_deref(), Some("later"));
		assert_eq!(loaded.completion.max_tokens, Some(10));
	}

	#[tokio::test]
	async fn test_single_file_with_context_hook() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("suite.yml");
		tokio::fs::write(
			&path,
			"families:\n  upper:\n    template: \"{{ shout }}\"\nprompts:\n  - input: hey\n    family: upper\n",
		)
		.await
		.unwrap();

		let source = FilePromptSource::new(&path).with_context("upper", |input| {
			let mut ctx = Context::new();
			ctx.insert("shout".into(), input.to_uppercase().into());
			ctx
		});
		let prompts = source.load().await.unwrap();
		assert_eq!(prompts[0].render().unwrap(), "HEY");
	}

	#[tokio::test]
	async fn test_missing_and_invalid_files_fail() {
		let dir = tempfile::tempdir().unwrap();
		assert!(FilePromptSource::new(dir.path().join("nope.yaml")).load().await.is_err());

		let bad = dir.path().join("bad.json");
		tokio::fs::write(&bad, "{ prompts: ").await.unwrap();
		let err = FilePromptSource::new(&bad).load().await.err().expect("expected load to fail");
		assert!(err.to_string().contains("Invalid suite file"));
	}

	#[tokio::test]
	async fn test_vec_source() {
		let source = VecPromptSource::new(vec![Prompt::new("a"), Prompt::new("b")]);
		assert_eq!(source.load().await.unwrap().len(), 2);
	}
}

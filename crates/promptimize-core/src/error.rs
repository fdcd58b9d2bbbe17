use std::path::PathBuf;

use promptimize_types::{DocumentError, InsertError};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("prompt `{key}`: evaluator `{evaluator}` returned {value}, expected a number in [0, 1]")]
	EvaluationRange {
		key: String,
		evaluator: String,
		value: f64,
	},

	#[error("prompt `{key}` has not run yet, run it before testing")]
	NotRun { key: String },

	#[error("prompt `{key}`: template references undefined variable `{variable}`")]
	Template { key: String, variable: String },

	#[error("prompt `{key}`: completion call failed: {source}")]
	ExternalCall {
		key: String,
		#[source]
		source: BoxError,
	},

	#[error("duplicate prompt key `{0}`")]
	DuplicateKey(String),

	#[error("failed to write report to {path:?}: {source}")]
	ReportWrite {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to write run output: {0}")]
	Output(#[from] std::io::Error),

	#[error(transparent)]
	Document(#[from] DocumentError),

	#[error(transparent)]
	Insert(#[from] InsertError),

	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	/// Key of the prompt the error belongs to, if any.
	pub fn prompt_key(&self) -> Option<&str> {
		match self {
			Error::EvaluationRange { key, .. }
			| Error::NotRun { key }
			| Error::Template { key, .. }
			| Error::ExternalCall { key, .. } => Some(key),
			Error::DuplicateKey(key) => Some(key),
			_ => None,
		}
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

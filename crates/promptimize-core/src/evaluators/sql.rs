use std::str::FromStr;

use promptimize_types::Answer;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::evaluator::{score_of, Evaluator};

/// SQL dialect to use for parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlDialect {
	#[default]
	Generic,
	PostgreSQL,
	MySQL,
	SQLite,
}

impl SqlDialect {
	fn to_dialect(self) -> Box<dyn Dialect> {
		match self {
			SqlDialect::Generic => Box::new(GenericDialect {}),
			SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
			SqlDialect::MySQL => Box::new(MySqlDialect {}),
			SqlDialect::SQLite => Box::new(SQLiteDialect {}),
		}
	}
}

impl FromStr for SqlDialect {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"" | "generic" => Ok(SqlDialect::Generic),
			"postgres" | "postgresql" => Ok(SqlDialect::PostgreSQL),
			"mysql" => Ok(SqlDialect::MySQL),
			"sqlite" => Ok(SqlDialect::SQLite),
			other => Err(format!("unknown SQL dialect `{other}`")),
		}
	}
}

/// Scores 1 when the answer parses as one or more SQL statements.
///
/// Structured answers are read from their `sql` field. Markdown code fences
/// around the query are ignored.
pub struct SqlParses {
	dialect: SqlDialect,
}

impl SqlParses {
	pub fn new(dialect: SqlDialect) -> Self {
		Self { dialect }
	}
}

impl Default for SqlParses {
	fn default() -> Self {
		Self::new(SqlDialect::Generic)
	}
}

impl Evaluator for SqlParses {
	fn name(&self) -> &str {
		"sql"
	}

	fn evaluate(&self, answer: &Answer) -> f64 {
		let sql = match answer {
			Answer::Structured(v) => match v.get("sql").and_then(|s| s.as_str()) {
				Some(s) => s.to_string(),
				None => return 0.0,
			},
			Answer::Text(s) => strip_fences(s).to_string(),
		};

		let dialect = self.dialect.to_dialect();
		match Parser::parse_sql(&*dialect, &sql) {
			Ok(statements) => score_of(!statements.is_empty()),
			Err(_) => 0.0,
		}
	}
}

fn strip_fences(text: &str) -> &str {
	let trimmed = text.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	// drop the language tag line
	let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
	body.trim_end().trim_end_matches("```").trim()
}

use std::path::Path;

use promptimize_types::{from_document, records_table, to_document, OrderedMap, Position, PromptRecord, Style};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::suite::Suite;

const UNCATEGORIZED: &str = "uncategorized";

/// What [`Report::merge_with`] does with keys present in both reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
	/// Keep this report's record.
	#[default]
	KeepBase,
	/// Take the incoming record, in this report's position.
	Overwrite,
}

/// Per-category view of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
	pub category: String,
	pub prompts: usize,
	pub tested: usize,
	pub weight: f64,
	/// Weight-averaged score, absent when no record in the category has one.
	pub score: Option<f64>,
}

#[derive(Tabled)]
struct CategoryRow {
	category: String,
	prompts: usize,
	tested: usize,
	weight: f64,
	score: String,
}

/// A persisted, keyed snapshot of prompt records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
	records: OrderedMap<PromptRecord>,
}

impl Report {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_records(records: OrderedMap<PromptRecord>) -> Self {
		Self { records }
	}

	/// Loads a report document written in either style. A missing file is an
	/// empty report, and so is a document that cannot be read or parsed (with
	/// a warning).
	pub async fn from_path(path: impl AsRef<Path>) -> Report {
		let path = path.as_ref();
		let text = match tokio::fs::read_to_string(path).await {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(?path, "no prior report");
				return Report::new();
			}
			Err(e) => {
				warn!(?path, error = %e, "could not read report, starting empty");
				return Report::new();
			}
		};
		// the extension picks the first parser, the content may be either style
		let style = Style::from_path(path);
		let fallback = match style {
			Style::Yaml => Style::Json,
			Style::Json => Style::Yaml,
		};
		match from_document::<OrderedMap<PromptRecord>>(&text, style)
			.or_else(|_| from_document::<OrderedMap<PromptRecord>>(&text, fallback))
		{
			Ok(records) => Report { records },
			Err(e) => {
				warn!(?path, error = %e, "corrupt report, starting empty");
				Report::new()
			}
		}
	}

	/// Snapshot of every prompt that has run, in suite order.
	pub fn from_suite(suite: &Suite) -> Report {
		Self::from_suite_verbose(suite, false)
	}

	pub fn from_suite_verbose(suite: &Suite, verbose: bool) -> Report {
		Report {
			records: suite.records(verbose),
		}
	}

	pub fn records(&self) -> &OrderedMap<PromptRecord> {
		&self.records
	}

	pub fn get(&self, key: &str) -> Option<&PromptRecord> {
		self.records.get(key)
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Merges `other` into a copy of this report, keeping existing records.
	pub fn merge(&self, other: &Report) -> Result<Report> {
		self.merge_with(other, MergeMode::KeepBase)
	}

	/// Keys only in `other` are inserted right after the nearest key that
	/// precedes them in `other`, or before the nearest key that follows
	/// them when none precedes, or at the end. Their relative order is kept.
	pub fn merge_with(&self, other: &Report, mode: MergeMode) -> Result<Report> {
		let mut merged = self.records.clone();
		let incoming: Vec<&str> = other.records.keys().collect();

		for (idx, (key, record)) in other.records.iter().enumerate() {
			if let Some(existing) = merged.get_mut(key) {
				if mode == MergeMode::Overwrite {
					*existing = record.clone();
				}
				continue;
			}

			let position = incoming[..idx]
				.iter()
				.rev()
				.find(|k| merged.contains_key(k))
				.map(|k| Position::After(k.to_string()))
				.or_else(|| {
					incoming[idx + 1..]
						.iter()
						.find(|k| merged.contains_key(k))
						.map(|k| Position::Before(k.to_string()))
				})
				.unwrap_or(Position::Index(merged.len()));
			merged = merged.inserted(key, record.clone(), position)?;
		}

		Ok(Report { records: merged })
	}

	pub fn to_document(&self, style: Style) -> Result<String> {
		Ok(to_document(&self.records, style)?)
	}

	pub async fn write(&self, path: impl AsRef<Path>, style: Style) -> Result<()> {
		let path = path.as_ref();
		let doc = self.to_document(style)?;
		tokio::fs::write(path, doc).await.map_err(|source| Error::ReportWrite {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(?path, records = self.records.len(), %style, "report written");
		Ok(())
	}

	pub fn summary_table(&self) -> String {
		records_table(&self.records)
	}

	/// Categories in order of first appearance.
	pub fn category_summary(&self) -> Vec<CategorySummary> {
		// summary, weighted score sum, weight of scored records
		let mut acc: OrderedMap<(CategorySummary, f64, f64)> = OrderedMap::new();
		for record in self.records.values() {
			let name = record.category.as_deref().unwrap_or(UNCATEGORIZED);
			if !acc.contains_key(name) {
				let fresh = CategorySummary {
					category: name.to_string(),
					prompts: 0,
					tested: 0,
					weight: 0.0,
					score: None,
				};
				acc.insert(name, (fresh, 0.0, 0.0));
			}
			let Some((summary, weighted_sum, scored_weight)) = acc.get_mut(name) else {
				continue;
			};
			let weight = record.effective_weight();
			summary.prompts += 1;
			summary.weight += weight;
			if let Some(avg) = record.test_results_avg {
				summary.tested += 1;
				*weighted_sum += avg * weight;
				*scored_weight += weight;
			}
		}

		acc.into_iter()
			.map(|(_, (mut summary, weighted_sum, scored_weight))| {
				if scored_weight > 0.0 {
					summary.score = Some(weighted_sum / scored_weight);
				}
				summary
			})
			.collect()
	}

	pub fn category_table(&self) -> String {
		let rows = self.category_summary().into_iter().map(|c| CategoryRow {
			category: c.category,
			prompts: c.prompts,
			tested: c.tested,
			weight: c.weight,
			score: c.score.map(|s| format!("{s:.3}")).unwrap_or_else(|| "-".to_string()),
		});
		Table::new(rows).to_string()
	}
}

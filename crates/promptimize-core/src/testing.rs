use anyhow::Result;
use promptimize_types::records_table;

use crate::suite::Suite;

/// Helper to assert a suite's score meets a threshold.
///
/// Use this in your `#[tokio::test]` functions after executing a suite.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_my_prompts() -> Result<()> {
///     let mut suite = Suite::builder()
///         .prompts(prompts)
///         .completion(completion)
///         .build()?;
///
///     suite.execute(&ExecuteOptions { silent: true, ..Default::default() }).await?;
///
///     // Assert a 0.8 average score
///     assert_suite_score(&suite, 0.8)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_suite_score(suite: &Suite, min_score: f64) -> Result<()> {
	match suite.suite_score() {
		Some(score) if score >= min_score => Ok(()),
		Some(score) => anyhow::bail!(
			"Suite failed: score {:.3} is below threshold {:.3}\n{}",
			score,
			min_score,
			records_table(&suite.records(false))
		),
		None => anyhow::bail!("Suite failed: no prompt was tested"),
	}
}

/// Helper to assert every prompt in the suite ran and was tested.
pub fn assert_all_tested(suite: &Suite) -> Result<()> {
	let untested: Vec<&str> = suite
		.prompts()
		.values()
		.filter(|p| !p.was_tested())
		.map(|p| p.key())
		.collect();
	if !untested.is_empty() {
		anyhow::bail!(
			"Suite failed: {}/{} prompts tested, missing {}\n{}",
			suite.prompts().len() - untested.len(),
			suite.prompts().len(),
			untested.join(", "),
			records_table(&suite.records(false))
		);
	}
	Ok(())
}

// End-to-end runs against a scripted completion, with reports on disk.

use std::sync::Arc;

use promptimize_core::*;
use serde_json::json;

fn scripted() -> Arc<dyn Completion> {
	from_async_fn(|prompt: String, _| async move {
		if prompt.contains("customers") {
			Ok("Here you go:\n{\"sql\": \"SELECT name FROM customers LIMIT 10\"}\n".to_string())
		} else {
			Ok(format!("\n\nYou said: {prompt}\n"))
		}
	})
}

fn prompts() -> Vec<Prompt> {
	let sql = Arc::new(
		PromptFamily::new("sql", "Dialect: {{ dialect }}\nWrite SQL for: {{ input }}")
			.default_var("dialect", "Postgres"),
	);
	vec![
		Prompt::new("hello there!")
			.with_key("greet")
			.with_evaluator(Arc::new(WordMatch::any(["hello", "hi"]))),
		sql.prompt("top 10 customers")
			.with_key("top-customers")
			.with_category("sql")
			.with_weight(2.0)
			.expecting_json(true)
			.with_evaluator(Arc::new(SqlParses::new(SqlDialect::PostgreSQL)))
			.with_evaluator(Arc::new(JsonSchema::new(&json!({"type": "object", "required": ["sql"]})).unwrap())),
		Prompt::new("what is 2 + 2?")
			.with_key("math")
			.with_evaluator(Arc::new(Contains::new("5"))),
	]
}

fn quiet() -> ExecuteOptions {
	ExecuteOptions {
		silent: true,
		..Default::default()
	}
}

#[tokio::test]
async fn test_suite_scores_and_reports() -> anyhow::Result<()> {
	let mut suite = Suite::builder().prompts(prompts()).completion(scripted()).build()?;
	let summary = suite.execute_to(&mut Vec::<u8>::new(), &quiet()).await?;

	assert_all_tested(&suite)?;
	// greet 1.0, top-customers 1.0, math 0.0
	assert_eq!(summary.tested, 3);
	let score = summary.suite_score.unwrap();
	assert!((score - 2.0 / 3.0).abs() < 1e-9);
	assert_suite_score(&suite, 0.6)?;
	assert!(assert_suite_score(&suite, 0.9).is_err());

	let report = Report::from_suite(&suite);
	let sql = report.get("top-customers").unwrap();
	assert_eq!(sql.response_json, Some(json!({"sql": "SELECT name FROM customers LIMIT 10"})));
	assert_eq!(sql.weight, Some(2.0));
	let greet = report.get("greet").unwrap();
	assert_eq!(greet.response_text.as_deref(), Some("You said: hello there!"));

	let categories = report.category_summary();
	assert_eq!(categories[0].category, "uncategorized");
	assert_eq!(categories[0].prompts, 2);
	assert_eq!(categories[1].score, Some(1.0));
	Ok(())
}

#[tokio::test]
async fn test_filtered_rerun_keeps_prior_records() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;

	for (file, style) in [("report.yaml", Style::Yaml), ("report.json", Style::Json)] {
		let path = dir.path().join(file);

		let mut full = Suite::builder().prompts(prompts()).completion(scripted()).build()?;
		full.execute_to(&mut Vec::<u8>::new(), &quiet()).await?;
		Report::from_suite(&full).write(&path, style).await?;

		let prior = Report::from_path(&path).await;
		assert_eq!(prior.len(), 3);

		let mut partial = Suite::builder().prompts(prompts()).build()?;
		let opts = ExecuteOptions {
			dry_run: true,
			keys: Some(vec!["math".to_string()]),
			..quiet()
		};
		partial.execute_to(&mut Vec::<u8>::new(), &opts).await?;

		let merged = Report::from_suite(&partial).merge(&prior)?;
		let keys: Vec<&str> = merged.records().keys().collect();
		assert_eq!(keys, vec!["greet", "top-customers", "math"]);
		// fresh record wins for the key that ran
		assert_eq!(
			merged.get("math").unwrap().response_text.as_deref(),
			Some(DRY_RUN_PLACEHOLDER)
		);
		assert_eq!(merged.get("greet"), prior.get("greet"));

		merged.write(&path, style).await?;
		assert_eq!(Report::from_path(&path).await, merged);
	}
	Ok(())
}

#[tokio::test]
async fn test_unknown_document_fields_survive() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("report.yaml");
	tokio::fs::write(
		&path,
		"greet:\n  key: greet\n  input: hello there!\n  reviewer: sam\n",
	)
	.await?;

	let report = Report::from_path(&path).await;
	assert_eq!(report.get("greet").unwrap().extra.get("reviewer"), Some(&json!("sam")));
	report.write(&path, Style::Yaml).await?;
	let text = tokio::fs::read_to_string(&path).await?;
	assert!(text.contains("reviewer: sam"));
	Ok(())
}

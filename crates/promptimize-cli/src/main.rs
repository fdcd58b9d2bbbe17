use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use promptimize_core::{
	CompletionParams, ExecuteOptions, FilePromptSource, OpenAiCompletion, ParamOverrides, Report, Style, Suite,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "promptimize", about = "Run prompt suites and track their scores")]
struct Cli {
	/// Debug logging, and rendered prompts and raw responses in the output
	#[arg(short, long, global = true, action = ArgAction::SetTrue)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Run the prompts found in a suite file or directory
	Run(RunArgs),
	/// Print a saved report
	Report(ReportArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// Suite file, or directory of .yaml/.yml/.json suite files
	path: PathBuf,

	/// Skip the completion API and record a placeholder answer
	#[arg(long, action = ArgAction::SetTrue)]
	dry_run: bool,

	/// Style of the printed records and of the --output report: yaml or json
	#[arg(long, default_value = "yaml")]
	style: Style,

	#[arg(long)]
	max_tokens: Option<u32>,

	#[arg(long)]
	temperature: Option<f32>,

	/// Model identifier
	#[arg(long, alias = "engine")]
	model: Option<String>,

	/// Report file to merge this run into (.yaml, .yml or .json)
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Print only the run summary
	#[arg(short, long, action = ArgAction::SetTrue)]
	silent: bool,

	/// Run only this prompt key (repeatable)
	#[arg(short, long = "key")]
	keys: Vec<String>,

	/// Keep going when a prompt fails and list failures in the summary
	#[arg(long, action = ArgAction::SetTrue)]
	continue_on_error: bool,

	/// Completion calls in flight
	#[arg(long, default_value_t = 1)]
	concurrency: usize,

	/// Timeout for each completion call
	#[arg(long)]
	timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Parser)]
struct ReportArgs {
	/// Report file (.yaml, .yml or .json)
	path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let default_level = if cli.verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();

	match cli.command {
		Commands::Run(args) => run(args, cli.verbose).await?,
		Commands::Report(args) => report(args).await?,
	}
	Ok(())
}

async fn run(args: RunArgs, verbose: bool) -> Result<()> {
	let loaded = FilePromptSource::new(&args.path).load_suite().await?;

	// flags win over suite-file defaults
	let flags = ParamOverrides {
		model: args.model.clone(),
		max_tokens: args.max_tokens,
		temperature: args.temperature,
	};
	let params = CompletionParams::default()
		.with_overrides(&loaded.completion)
		.with_overrides(&flags);

	let mut builder = Suite::builder().prompts(loaded.prompts).params(params);
	if !args.dry_run {
		let timeout = args.timeout_secs.map(Duration::from_secs);
		builder = builder.completion(Arc::new(OpenAiCompletion::from_env(timeout)?));
	}
	let mut suite = builder.build()?;

	let prior = match &args.output {
		Some(path) => Report::from_path(path).await,
		None => Report::new(),
	};

	let opts = ExecuteOptions {
		dry_run: args.dry_run,
		silent: args.silent,
		verbose,
		style: args.style,
		keys: (!args.keys.is_empty()).then_some(args.keys),
		continue_on_error: args.continue_on_error,
		concurrency: args.concurrency,
	};
	let outcome = suite.execute(&opts).await;

	// whatever ran is saved, even when the run aborted
	if let Some(path) = &args.output {
		let report = Report::from_suite_verbose(&suite, verbose).merge(&prior)?;
		report.write(path, args.style).await?;
		info!(?path, records = report.len(), "report updated");
	}

	outcome?;
	Ok(())
}

async fn report(args: ReportArgs) -> Result<()> {
	let exists = tokio::fs::try_exists(&args.path)
		.await
		.with_context(|| format!("Failed to read {:?}", args.path))?;
	if !exists {
		anyhow::bail!("no report at {:?}", args.path);
	}

	let report = Report::from_path(&args.path).await;
	println!("{}", report.summary_table());
	println!("{}", report.category_table());
	Ok(())
}

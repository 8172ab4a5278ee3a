//! Codec conformance harness CLI
//!
//! The `conform` command runs decoder conformance cases from a registry.
//!
//! ## Commands
//!
//! - `run`: Run the selected cases and gate the overall result
//! - `list`: Show the cases a filter selects
//! - `models`: Show the declared decoder models

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use uuid::Uuid;

use conform_core::{Action, CaseFilter, CaseRegistry, HarnessConfig, TestCase};
use conform_exec::{
    truncate_logs, write_run_summary_json, CaseReport, CaseRunner, RunGate, RunSummary,
};

#[derive(Parser)]
#[command(name = "conform")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Codec decoder conformance harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Case registry (TOML)
    #[arg(
        short,
        long,
        global = true,
        env = "CONFORM_REGISTRY",
        default_value = "conform.toml"
    )]
    registry: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run conformance cases
    Run {
        #[command(flatten)]
        filter: FilterArgs,

        /// Files decoded in parallel within one case
        #[arg(short, long, env = "CONFORM_JOBS")]
        jobs: Option<usize>,

        /// Per-invocation timeout in seconds (0 disables it)
        #[arg(long, env = "CONFORM_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Keep generated decoder parameter files next to the case output
        #[arg(long)]
        keep_artifacts: bool,

        /// Stop after the first case that does not pass
        #[arg(long)]
        fail_fast: bool,

        /// Write a JSON summary of the run to this file
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// List cases selected by the filters
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List declared decoder models
    Models,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Case names to select (default: all cases)
    cases: Vec<String>,

    /// Only cases bound to this model
    #[arg(short, long)]
    model: Option<String>,

    /// Only cases for this codec
    #[arg(short, long)]
    codec: Option<String>,

    /// Only cases with this action (decode, digest, digest_by_frames, compare)
    #[arg(short, long)]
    action: Option<Action>,
}

impl From<FilterArgs> for CaseFilter {
    fn from(args: FilterArgs) -> Self {
        CaseFilter {
            names: args.cases,
            model: args.model,
            codec: args.codec,
            action: args.action,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    conform_core::init_tracing(cli.json, level);

    let registry = CaseRegistry::load(&cli.registry)
        .with_context(|| format!("Failed to load registry {}", cli.registry.display()))?;
    let registry = Arc::new(registry);

    match cli.command {
        Commands::Run {
            filter,
            jobs,
            timeout,
            keep_artifacts,
            fail_fast,
            results,
        } => {
            let mut config = HarnessConfig::default()
                .with_keep_artifacts(keep_artifacts)
                .with_fail_fast(fail_fast);
            if let Some(jobs) = jobs {
                config = config.with_concurrency(jobs);
            }
            if let Some(secs) = timeout {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            cmd_run(registry, filter.into(), config, results.as_deref()).await
        }
        Commands::List { filter } => cmd_list(&registry, &filter.into()),
        Commands::Models => cmd_models(&registry),
    }
}

/// Cases matching `filter`, in registry order.
///
/// Naming a case the registry does not hold is an error rather than an
/// empty selection.
fn select_cases<'a>(registry: &'a CaseRegistry, filter: &CaseFilter) -> Result<Vec<&'a TestCase>> {
    for name in &filter.names {
        if registry.case(name).is_none() {
            anyhow::bail!("Unknown case: {}", name);
        }
    }
    Ok(registry.select(filter))
}

/// Run the selected cases and gate the result
async fn cmd_run(
    registry: Arc<CaseRegistry>,
    filter: CaseFilter,
    config: HarnessConfig,
    results: Option<&Path>,
) -> Result<()> {
    let cases = select_cases(&registry, &filter)?;
    if cases.is_empty() {
        warn!("no case matched the filters");
    }

    truncate_logs(cases.iter().map(|c| c.stdout_log.as_path()))
        .context("Failed to reset case logs")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling in-flight work");
            let _ = cancel_tx.send(true);
        }
    });

    info!(
        cases = cases.len(),
        concurrency = config.concurrency,
        timeout_secs = config.timeout.as_secs(),
        "starting conformance run"
    );
    let runner = CaseRunner::new(Arc::clone(&registry), config).with_cancel(cancel_rx);
    let reports = runner.run_all(&cases).await;

    for report in &reports {
        println!("{}", case_line(report));
    }
    if reports.len() < cases.len() {
        println!("  - {} case(s) not run", cases.len() - reports.len());
    }

    let verdict = RunGate::evaluate(&reports);
    println!();
    println!("Summary: {}/{} cases passed", verdict.cases_passed, reports.len());
    println!("Gate: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });

    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }

    if let Some(path) = results {
        let summary = RunSummary {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            verdict: verdict.clone(),
            cases: reports,
        };
        write_run_summary_json(path, &summary)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        println!("Results: {}", path.display());
    }

    if verdict.passed {
        println!("\n✓ All cases passed!");
        Ok(())
    } else {
        anyhow::bail!("Conformance run failed: {}", verdict.message)
    }
}

/// Console line for one finished case
fn case_line(report: &CaseReport) -> String {
    let status = if report.passed() { "✓" } else { "✗" };
    let mut line = format!("  {} {}", status, report.summary_line());
    if let Some(error) = &report.error {
        line.push_str(&format!(" ({})", error));
    }
    line
}

/// List the selected cases
fn cmd_list(registry: &CaseRegistry, filter: &CaseFilter) -> Result<()> {
    let cases = select_cases(registry, filter)?;
    if cases.is_empty() {
        println!("No cases found.");
        return Ok(());
    }

    println!("{:<40} {:<16} {:<8} ACTION", "CASE", "MODEL", "CODEC");
    for case in &cases {
        println!("{:<40} {:<16} {:<8} {}", case.name, case.model, case.codec, case.action);
    }
    println!();
    println!("{} case(s)", cases.len());
    Ok(())
}

/// List the declared models and what they support
fn cmd_models(registry: &CaseRegistry) -> Result<()> {
    let mut any = false;
    for model in registry.models() {
        any = true;
        let codecs: Vec<&str> = model.supported_codecs.iter().map(String::as_str).collect();
        let actions: Vec<&str> = model.supported_actions.iter().map(|a| a.as_str()).collect();
        println!("{} ({})", model.name, model.adapter);
        println!("  executable: {}", model.executable_path.display());
        println!("  codecs:     {}", codecs.join(", "));
        println!("  actions:    {}", actions.join(", "));
    }
    if !any {
        println!("No models declared.");
    }
    Ok(())
}

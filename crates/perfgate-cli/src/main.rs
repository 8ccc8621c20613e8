//! perfgate - performance-gated deployment CLI
//!
//! ## Commands
//!
//! - `run`: build a revision, audit it N times, gate, deploy on pass
//! - `validate`: parse and validate a config (native or lighthouserc)
//! - `render`: print the markdown summary of a saved run report

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn, Level};

use perfgate_ci::{
    AbortHandle, CiConfigFile, CommandBuilder, CommandMeasurer, CommandPublisher, GatePipeline,
    PipelineResult,
};
use perfgate_core::{
    read_run_report_json, render_run_report_md, AssertionOutcome, FileReportSink,
    PipelineConfig, PipelineOutcome, METRICS,
};

#[derive(Parser)]
#[command(name = "perfgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Performance-gated deployment pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and a JSON result
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one revision
    Run {
        /// Pipeline config file (JSON)
        #[arg(short, long, env = "PERFGATE_CONFIG")]
        config: PathBuf,

        /// Source revision to gate
        #[arg(short, long)]
        revision: String,

        /// Retry transient stage errors with a fresh run, up to N times
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Directory for run reports (overrides `reportTarget`)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Parse and validate a config, printing the normalized form
    Validate {
        /// Config file to check
        #[arg(short, long)]
        config: PathBuf,

        /// Treat the file as a Lighthouse-CI `lighthouserc.json`
        #[arg(long)]
        lighthouserc: bool,
    },

    /// Render a saved run report as markdown
    Render {
        /// Report JSON written by a previous run
        #[arg(long)]
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    perfgate_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Run {
            config,
            revision,
            retries,
            report_dir,
        } => cmd_run(&config, &revision, retries, report_dir, cli.json).await?,
        Commands::Validate {
            config,
            lighthouserc,
        } => cmd_validate(&config, lighthouserc)?,
        Commands::Render { report } => cmd_render(&report)?,
    };
    Ok(code)
}

/// Exit status per pipeline outcome.
fn exit_code(outcome: PipelineOutcome) -> ExitCode {
    match outcome {
        PipelineOutcome::Deployed => ExitCode::SUCCESS,
        PipelineOutcome::GateRejected => ExitCode::from(1),
        PipelineOutcome::Errored => ExitCode::from(2),
        PipelineOutcome::DeployFailed => ExitCode::from(3),
        PipelineOutcome::Aborted => ExitCode::from(130),
    }
}

async fn cmd_run(
    config_path: &Path,
    revision: &str,
    retries: u32,
    report_dir: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let file = CiConfigFile::load(config_path)?;
    let report_dir = report_dir.or_else(|| file.pipeline.report_target.as_ref().map(PathBuf::from));

    let mut pipeline = GatePipeline::new(
        Arc::new(file.pipeline),
        Arc::new(CommandBuilder::new(file.build)),
        Arc::new(CommandMeasurer::new(file.measure)),
        Arc::new(CommandPublisher::new(file.publish)),
    );
    if let Some(dir) = report_dir {
        pipeline = pipeline.with_report_sink(Arc::new(FileReportSink::new(dir)));
    }

    let (handle, signal) = AbortHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting run");
            handle.abort();
        }
    });

    let mut attempt = 0;
    let result = loop {
        attempt += 1;
        let result = pipeline
            .run_with_abort(revision, signal.clone())
            .await
            .context("pipeline run failed")?;
        if result.is_retryable() && attempt <= retries {
            warn!(
                run_id = %result.run_id(),
                attempt = attempt,
                error = result.error.as_deref().unwrap_or_default(),
                "transient failure, retrying with a fresh run"
            );
            continue;
        }
        break result;
    };

    METRICS.flush();

    if json {
        println!("{}", serde_json::to_string_pretty(&RunOutput::from(&result))?);
    } else {
        print_result(&result);
    }
    info!(run_id = %result.run_id(), outcome = result.outcome().as_str(), "done");
    Ok(exit_code(result.outcome()))
}

/// Machine-readable summary printed with `--json`.
#[derive(Serialize)]
struct RunOutput<'a> {
    run_id: &'a str,
    revision: &'a str,
    status: &'a str,
    outcome: &'a str,
    retryable: bool,
    error: Option<&'a str>,
    deployment_id: Option<&'a str>,
    report_url: Option<&'a str>,
    outcomes: &'a [AssertionOutcome],
}

impl<'a> From<&'a PipelineResult> for RunOutput<'a> {
    fn from(result: &'a PipelineResult) -> Self {
        Self {
            run_id: result.run_id().as_str(),
            revision: result.run.revision(),
            status: result.status().as_str(),
            outcome: result.outcome().as_str(),
            retryable: result.is_retryable(),
            error: result.error.as_deref(),
            deployment_id: result.deploy.deployment_id(),
            report_url: result.report_url.as_deref(),
            outcomes: result.outcomes(),
        }
    }
}

fn print_result(result: &PipelineResult) {
    println!("Run ID:   {}", result.run_id());
    println!("Revision: {}", result.run.revision());
    println!("Status:   {}", result.status());
    println!("Outcome:  {}", result.outcome().as_str());
    println!("Duration: {}ms", result.duration_ms);
    if let Some(error) = &result.error {
        println!("Error:    {}", error);
    }
    println!();

    for metric in result.metrics.values() {
        println!(
            "  {:<16} {:.2} ({} passes)",
            metric.category,
            metric.score,
            metric.sample_count()
        );
    }
    for outcome in result.outcomes() {
        let mark = if outcome.satisfied { "✓" } else { "✗" };
        println!("  {} {}", mark, outcome.describe());
    }

    if let Some(id) = result.deploy.deployment_id() {
        println!();
        println!("Deployed: {}", id);
    }
    if let Some(url) = &result.report_url {
        println!("Report:   {}", url);
    }
}

fn cmd_validate(path: &Path, lighthouserc: bool) -> Result<ExitCode> {
    let config = if lighthouserc {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let doc: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))?;
        PipelineConfig::from_lighthouserc(&doc).context("import lighthouserc")?
    } else {
        CiConfigFile::load(path)?.pipeline
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    info!(
        passes = config.number_of_passes,
        assertions = config.assertions.len(),
        "config is valid"
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_render(path: &Path) -> Result<ExitCode> {
    let report = read_run_report_json(path)?;
    print!("{}", render_run_report_md(&report));
    Ok(ExitCode::SUCCESS)
}

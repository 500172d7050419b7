//! rankeval CLI - ranking quality evaluation
//!
//! This binary scores pre-fetched search results against relevance judgments
//! and stores or inspects evaluation runs.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use rankeval::{apply_overrides, load_requests, load_run, render_report, save_run};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rankeval_core::config::Config;
use rankeval_core::{DetailsRegistry, Evaluator};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rankeval")]
#[command(about = "Evaluate search ranking quality against relevance judgments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a JSON file of rated requests and print the report
    Evaluate {
        /// JSON array of {id, ratings, hits} entries
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Metric kind, overriding the configuration
        #[arg(long)]
        metric: Option<String>,

        /// Number of top hits to score, overriding the configuration
        #[arg(long)]
        top_n: Option<usize>,

        /// Store the binary encoding of the run
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Print a stored run as JSON
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List registered metric breakdown tags
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Evaluate {
            input,
            metric,
            top_n,
            save,
        } => evaluate(cli.config.as_deref(), &input, metric, top_n, save.as_deref()).await,
        Commands::Inspect { file } => inspect(&file),
        Commands::Metrics => {
            for tag in DetailsRegistry::global().tags() {
                println!("{tag}");
            }
            Ok(())
        }
    }
}

/// Initialize logging system
///
/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("rankeval={level},rankeval_core={level}"))
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn evaluate(
    config_path: Option<&Path>,
    input: &Path,
    metric: Option<String>,
    top_n: Option<usize>,
    save: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut config, metric, top_n);
    let evaluator = Evaluator::from_config(&config).context("Invalid configuration")?;

    let requests = load_requests(input)?;
    info!(
        "Loaded {} queries from {}",
        requests.len(),
        input.display()
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl+C, cancelling queries that have not started");
                signal_token.cancel();
            }
            Err(e) => {
                error!("Error setting up signal handler: {e}");
            }
        }
    });

    let run = evaluator.run(requests, &cancel).await;
    signal_task.abort();
    let run = run.context("Evaluation failed")?;

    println!("{}", render_report(&run)?);

    if let Some(path) = save {
        save_run(path, &run)?;
        info!("Saved evaluation run to {}", path.display());
    }

    let quality = run
        .require_quality_level()
        .context("No query could be evaluated")?;
    info!("Overall {} quality: {quality:.4}", run.metric());
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let run = load_run(file, DetailsRegistry::global())?;
    println!("{}", render_report(&run)?);
    Ok(())
}

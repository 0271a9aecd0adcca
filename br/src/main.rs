//! BatchRun CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use batchrun::cli::{Cli, Command, OutputFormat};
use batchrun::config::Config;
use batchrun::executor::{Executor, HttpExecutor};
use batchrun::runner::{BatchRunner, RunReport};
use resultstore::{ResultRecord, ResultStore};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Run {
            batch,
            workers,
            max_retries,
            output,
            endpoints,
        }) => cmd_run(config, &batch, workers, max_retries, output, endpoints).await,
        Some(Command::Status { output, format }) => cmd_status(&config, output, format).await,
        Some(Command::Export { output }) => cmd_export(&config, output).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Run a batch to completion
async fn cmd_run(
    mut config: Config,
    batch: &PathBuf,
    workers: Option<usize>,
    max_retries: Option<u32>,
    output: Option<PathBuf>,
    endpoints: Vec<String>,
) -> Result<()> {
    // CLI overrides beat the config file
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(max_retries) = max_retries {
        config.max_retries = max_retries;
    }
    if let Some(output) = output {
        config.output = output;
    }
    if !endpoints.is_empty() {
        config.endpoints = endpoints;
    }

    config.validate()?;

    let executor: Arc<dyn Executor> =
        Arc::new(HttpExecutor::from_config(&config.executor).context("Failed to create HTTP executor")?);

    let runner = BatchRunner::new(config, executor);

    // Ctrl+C requests a cooperative shutdown: workers finish their
    // in-flight call, then the report covers whatever is left.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = runner.run(batch, shutdown_rx).await?;
    print_report(&report);

    if report.aborted.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("Run {} finished", report.run_id);
    println!("  Batch size:        {}", report.batch_total);
    if report.already_persisted > 0 {
        println!("  Already persisted: {}", report.already_persisted);
    }
    println!("  {} {}", "Succeeded:".green(), report.succeeded);
    println!(
        "  {} {}",
        "Permanently failed:".red(),
        report.permanently_failed.len()
    );
    for failure in &report.permanently_failed {
        println!("    {} - {}", failure.id.red(), failure.reason);
    }
    if report.still_pending > 0 {
        println!("  {} {}", "Still pending:".yellow(), report.still_pending);
    }
    if let Some(reason) = &report.aborted {
        println!("  {} {}", "Aborted:".red().bold(), reason);
    }
    println!(
        "  Success rate: {:.1}%, mean latency: {:.0} ms",
        report.stats.success_rate * 100.0,
        report.stats.mean_latency_ms
    );
}

/// Show what the result store currently holds (read-only)
async fn cmd_status(config: &Config, output: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = output.unwrap_or_else(|| config.output.clone());

    if !path.exists() {
        println!("No result store found at: {}", path.display());
        return Ok(());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read result store")?;
    let records: Vec<ResultRecord> = serde_json::from_str(&content).context("Result store is not a valid array")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": path.to_string_lossy(),
                "results": records.len(),
                "keys": records.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Result store: {}", path.display());
            println!("  Results: {}", records.len());
            if let Some(last) = records.last() {
                println!("  Last key: {} ({})", last.key, last.timestamp);
            }
        }
    }

    Ok(())
}

/// Compact the append log into the JSON array file
async fn cmd_export(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| config.output.clone());

    let store = ResultStore::open(&path).context("Failed to open result store")?;
    store.export().await.context("Failed to export array")?;
    println!("Exported {} results to {}", store.len().await, path.display());

    Ok(())
}

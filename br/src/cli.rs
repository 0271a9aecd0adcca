//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BatchRun - concurrent batch dispatcher with endpoint rotation
#[derive(Parser)]
#[command(
    name = "batchrun",
    about = "Distribute a batch of tasks across concurrent workers with crash-safe resume",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a batch, resuming past completed work in the result store
    Run {
        /// Batch file: JSON array of {id, payload}, or one payload per line
        #[arg(value_name = "BATCH")]
        batch: PathBuf,

        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-task retry ceiling
        #[arg(short, long)]
        max_retries: Option<u32>,

        /// Result store path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Endpoint to use (repeatable; overrides the config list)
        #[arg(short, long = "endpoint", value_name = "URL")]
        endpoints: Vec<String>,
    },

    /// Show what the result store currently holds
    Status {
        /// Result store path (defaults to the configured output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compact the append log into the JSON array file
    Export {
        /// Result store path (defaults to the configured output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Output format for status output
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

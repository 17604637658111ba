//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use std::path::PathBuf;
use uuid::Uuid;

/// txnflow - CSV transaction ingestion pipeline
#[derive(Parser)]
#[command(
    name = "tf",
    about = "CSV transaction ingestion pipeline",
    version,
    after_help = "Logs are written to: ~/.local/share/txnflow/logs/txnflow.log"
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
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run one CSV end to end: upload, map, validate, materialize
    Process {
        /// CSV file to ingest
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// YAML file of `source column: canonical field` pairs
        #[arg(short, long)]
        mapping: PathBuf,

        /// Seconds to wait for a terminal status
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Show the processing status of a file
    Status {
        /// File id from the upload receipt
        file_id: Uuid,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List validation errors for a file
    Errors {
        /// File id from the upload receipt
        file_id: Uuid,

        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Errors per page
        #[arg(short, long, default_value = "10")]
        size: usize,
    },

    /// Reconciliation report over a date range
    Report {
        /// Inclusive range start (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Inclusive range end (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Break the total down by shipping city
        #[arg(long)]
        by_city: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for read commands
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

/// Path of the CLI log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("txnflow")
        .join("logs")
        .join("txnflow.log")
}

//! txnflow - CSV transaction ingestion pipeline
//!
//! CLI entry point: run files through the pipeline, query statuses and
//! validation errors, and produce reconciliation reports.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::info;
use uuid::Uuid;

use txnflow::boundary::MappingRequest;
use txnflow::cli::{Cli, Command, OutputFormat, get_log_path};
use txnflow::config::Config;
use txnflow::ledger::StatusLedger;
use txnflow::pipeline::Pipeline;
use txnstore::{PipelineStatus, Store};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Log to a file, keeping stdout for command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Process { file, mapping, timeout } => {
            cmd_process(&config, &file, &mapping, timeout).await
        }
        Command::Status { file_id, format } => cmd_status(&config, file_id, format),
        Command::Errors { file_id, page, size } => cmd_errors(&config, file_id, page, size),
        Command::Report { start, end, by_city, format } => {
            cmd_report(&config, start, end, by_city, format)
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<Store>> {
    let store = Store::open(&config.storage.database_path)
        .context("Failed to open transaction store")?;
    Ok(Arc::new(store))
}

/// Run one file end to end and report the outcome
async fn cmd_process(config: &Config, file: &Path, mapping: &Path, timeout: u64) -> Result<()> {
    let store = open_store(config)?;
    let pipeline = Pipeline::start(config, store.clone());

    let bytes = fs::read(file).context(format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());

    let receipt = pipeline.upload(bytes, &filename).await?;
    println!("Uploaded {} as {}", filename, receipt.file_id);
    println!("  Headers: {}", receipt.headers.join(", "));
    println!("  {}", receipt.message);

    let pairs = load_mapping_pairs(mapping)?;
    pipeline
        .save_mapping(MappingRequest {
            file_id: receipt.file_id,
            mappings: pairs,
        })
        .await?;
    info!(file_id = %receipt.file_id, "Mapping submitted, waiting for verdict");

    let ledger = pipeline.ledger().clone();
    let verdict = wait_for_verdict(&ledger, receipt.file_id, timeout).await?;

    match verdict {
        PipelineStatus::Completed => {
            // Drain the queues so materialization has finished before we count
            pipeline.shutdown().await;
            let count = store.count_for_file(receipt.file_id)?;
            println!();
            println!("Validation passed. {} transactions materialized.", count);
            Ok(())
        }
        PipelineStatus::Failed => {
            let errors = ledger.errors(receipt.file_id, 1, 20)?;
            println!();
            println!("Validation failed with {} error(s):", errors.len());
            for error in &errors {
                println!("  {}", error);
            }
            pipeline.shutdown().await;
            std::process::exit(1);
        }
        PipelineStatus::Processing => unreachable!("wait_for_verdict only returns terminal statuses"),
    }
}

/// Poll the ledger until the file reaches a terminal status
async fn wait_for_verdict(
    ledger: &Arc<StatusLedger>,
    file_id: Uuid,
    timeout: u64,
) -> Result<PipelineStatus> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);
    loop {
        if let Some((status, _)) = ledger.get(file_id)? {
            if status.is_terminal() {
                return Ok(status);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(eyre!("Timed out after {}s waiting for processing to finish", timeout));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Show processing status for a file
fn cmd_status(config: &Config, file_id: Uuid, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let ledger = StatusLedger::new(store);
    let report = match ledger.get(file_id)? {
        Some((status, error_count)) => {
            txnflow::boundary::StatusReport::found(file_id, status, error_count)
        }
        None => txnflow::boundary::StatusReport::not_found(file_id),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("File: {}", report.file_id);
            println!("Status: {}", report.status);
            if let Some(count) = report.error_count {
                println!("Errors: {}", count);
            }
        }
    }
    Ok(())
}

/// List validation errors for a file
fn cmd_errors(config: &Config, file_id: Uuid, page: usize, size: usize) -> Result<()> {
    let store = open_store(config)?;
    let ledger = StatusLedger::new(store);
    let errors = ledger.errors(file_id, page, size)?;

    if errors.is_empty() {
        println!("No errors on page {} for file {}", page, file_id);
        return Ok(());
    }
    for error in &errors {
        println!("{}", error);
    }
    Ok(())
}

/// Reconciliation report over a date range
fn cmd_report(
    config: &Config,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
    by_city: bool,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config)?;
    let total = store.total_amount_for_period(start, end)?;

    if by_city {
        let cities = store.totals_by_city(start, end)?;
        match format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "start": start.to_string(),
                    "end": end.to_string(),
                    "total": total.to_string(),
                    "byCity": cities,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => {
                println!("Transactions {} to {}", start, end);
                println!("-------------------------------");
                for city in &cities {
                    println!("  {:<20} {}", city.city, city.total);
                }
                println!("  {:<20} {}", "Total", total);
            }
        }
    } else {
        match format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "start": start.to_string(),
                    "end": end.to_string(),
                    "total": total.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => {
                println!("Total for {} to {}: {}", start, end, total);
            }
        }
    }
    Ok(())
}

/// Read a YAML mapping file into ordered `source -> canonical` pairs
fn load_mapping_pairs(path: &Path) -> Result<Vec<(String, String)>> {
    let content =
        fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).context("Failed to parse mapping file")?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| eyre!("Mapping file must be a map of source column to canonical field"))?;

    mapping
        .iter()
        .map(|(k, v)| {
            let source = k
                .as_str()
                .ok_or_else(|| eyre!("Mapping keys must be strings"))?;
            let canonical = v
                .as_str()
                .ok_or_else(|| eyre!("Mapping values must be strings"))?;
            Ok((source.to_string(), canonical.to_string()))
        })
        .collect()
}

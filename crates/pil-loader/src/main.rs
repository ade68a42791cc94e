//! Patient Integration Loader binary.
//!
//! Bootstrap: `.env` load, logging, configuration validation, input file
//! check, database connect, then one pipeline run. An interrupt closes the
//! database connection without waiting for an in-flight cascade; rows
//! buffered but not yet flushed are lost.

use anyhow::{Context, Result};
use clap::Parser;
use pil_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use pil_loader::config::{LoaderConfig, DEFAULT_BULK_RECORDS, DEFAULT_EMAILS_PER_PATIENT};
use pil_loader::loader::DataLoader;
use pil_loader::store::postgres::PgPatientStore;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pil-loader")]
#[command(author, version, about = "Patient flat-file import and email scheduling")]
struct Cli {
    /// Delimited patient file to import
    #[arg(short, long, env = "CSV_FILE_NAME")]
    file: PathBuf,

    /// Number of records per bulk upsert
    #[arg(short, long, env = "BULK_RECORDS", default_value_t = DEFAULT_BULK_RECORDS)]
    bulk_records: usize,

    /// Follow-up emails scheduled per consenting patient
    #[arg(long, env = "NUMBER_OF_EMAILS", default_value_t = DEFAULT_EMAILS_PER_PATIENT)]
    emails: u32,

    /// Field delimiter
    #[arg(long, env = "CSV_SEPARATOR", default_value_t = '|')]
    delimiter: char,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables override these defaults per field.
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Both)
        .file_prefix("pil-loader")
        .build()
        .with_env_overrides()?;
    init_logging(&log_config)?;

    info!("application start");

    let config = LoaderConfig::new(cli.file.clone(), cli.bulk_records)?
        .with_emails_per_patient(cli.emails)
        .with_delimiter(cli.delimiter)?;

    // Check the input before touching the database so a bad path fails
    // cheaply.
    if !tokio::fs::try_exists(&config.file_name).await.unwrap_or(false) {
        error!(file = %config.file_name.display(), "file does not exist");
        anyhow::bail!("file {} does not exist", config.file_name.display());
    }
    info!(file = %config.file_name.display(), "file exists");

    info!("connecting to the database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to the database")?;
    info!("successfully established connection");

    let store = PgPatientStore::new(pool.clone());
    store
        .ensure_schema()
        .await
        .context("Failed to prepare database schema")?;

    let loader = DataLoader::new(config, store)?;

    let outcome = tokio::select! {
        result = loader.execute() => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, closing database connection");
            None
        }
    };

    pool.close().await;

    match outcome {
        Some(Ok(summary)) => {
            info!(
                patients = summary.records_upserted,
                emails = summary.tasks_scheduled,
                "data successfully loaded"
            );
            Ok(())
        }
        Some(Err(e)) => {
            error!(error = %e, "data loading failure, resolve the error(s) and execute again");
            Err(e.into())
        }
        None => Ok(()),
    }
}

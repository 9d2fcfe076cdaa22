//! Database Archive Tool
//!
//! Dumps each named database, uploads the archive to object storage and
//! prunes archives older than the retention window.

// dbarchiver/src/main.rs
mod backup;
mod config;
mod errors;

use anyhow::{Context, Result};
use backup::db_dump::DumpToolArchiver;
use backup::s3_upload::S3Storage;
use clap::{CommandFactory, Parser};
use config::{AppConfig, DEFAULT_CONFIG_FILE, KeyScheme};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dbarchiver",
    version = config::BUILD_ID,
    about = "Archive databases to object storage and prune old archives",
    override_usage = "dbarchiver [OPTIONS] db1 [db2 [db3 [...]]]"
)]
struct Cli {
    /// Upload with tag; tagged archives are stored under `<db>_tag/` and never pruned
    #[arg(long)]
    tag: Option<String>,

    /// Runtime settings file (defaults to ./config.json when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delete remote archives older than this many years (overrides config.json)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    retention_years: Option<u32>,

    /// Key layout for untagged uploads (overrides config.json)
    #[arg(long, value_enum)]
    key_scheme: Option<KeyScheme>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Databases to back up, processed in the given order
    #[arg(value_name = "DATABASE")]
    databases: Vec<String>,
}

/// Main entry point for the archive tool
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.databases.is_empty() {
        return match print_usage(&mut std::io::stdout()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to print usage: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run_app(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Version: {}\n", config::BUILD_ID)?;
    writeln!(out, "BucketName: {}\n", config::BUCKET_NAME)?;
    write!(out, "{}", Cli::command().render_help())?;
    out.flush()
}

/// An empty `--tag=` means "no tag"; a slash would split the key layout.
fn normalize_tag(tag: Option<&str>) -> Result<Option<String>> {
    match tag.map(str::trim) {
        None | Some("") => Ok(None),
        Some(tag) if tag.contains('/') => {
            anyhow::bail!("--tag must not contain '/': {}", tag)
        }
        Some(tag) => Ok(Some(tag.to_string())),
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let tag = normalize_tag(cli.tag.as_deref())?;

    let (config_path, explicitly_requested) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let mut app_config = AppConfig::load_from_json(&config_path, explicitly_requested)
        .with_context(|| {
            format!(
                "Failed to load application configuration from {}",
                config_path.display()
            )
        })?;
    if let Some(years) = cli.retention_years {
        app_config.backup_config.retention_years = years;
    }
    if let Some(key_scheme) = cli.key_scheme {
        app_config.backup_config.key_scheme = key_scheme;
    }

    let archiver = DumpToolArchiver::from_config(&app_config.backup_config)?;
    let store = S3Storage::connect(&app_config.storage_config)
        .await
        .context("Failed to set up the storage client")?;

    info!(
        "🚀 Backing up {} database(s) to bucket {} (retention {} year(s){})",
        cli.databases.len(),
        app_config.storage_config.bucket_name,
        app_config.backup_config.retention_years,
        tag.as_deref()
            .map(|t| format!(", tag `{}`", t))
            .unwrap_or_default()
    );

    let summary = backup::run_backup_flow(
        &app_config.backup_config,
        &archiver,
        &store,
        &cli.databases,
        tag.as_deref(),
    )
    .await
    .context("Backup run could not start")?;

    summary.log();
    Ok(())
}

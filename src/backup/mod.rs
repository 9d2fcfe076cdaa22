mod logic;
pub(crate) mod db_dump;
pub(crate) mod retention;
pub(crate) mod s3_upload;
pub(crate) mod storage;
pub(crate) mod upload;
#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;
use tempfile::{Builder as TempFileBuilder, TempDir};
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use db_dump::Archiver;
use logic::RunSummary;
use retention::RetentionPolicy;
use storage::ObjectStore;
use upload::Uploader;

const WORK_DIR_PREFIX: &str = "backup_tmp";

fn create_work_dir(temp_dump_root: Option<&Path>) -> Result<TempDir> {
    let mut builder = TempFileBuilder::new();
    builder.prefix(WORK_DIR_PREFIX);
    match temp_dump_root {
        Some(root) => {
            fs::create_dir_all(root).with_context(|| {
                format!("Failed to create temp dump root {}", root.display())
            })?;
            builder.tempdir_in(root).with_context(|| {
                format!("Failed to create work directory under {}", root.display())
            })
        }
        None => builder
            .tempdir()
            .context("Failed to create work directory in the system temp dir"),
    }
}

/// Runs one backup pass over `databases`.
///
/// The work directory and the retention cutoff are fixed for the whole run.
/// Only failing to create the work directory is an error; everything that
/// goes wrong for an individual database is reported in the summary.
pub async fn run_backup_flow<A, S>(
    backup_config: &BackupConfig,
    archiver: &A,
    store: &S,
    databases: &[String],
    tag: Option<&str>,
) -> Result<RunSummary>
where
    A: Archiver + ?Sized,
    S: ObjectStore + ?Sized,
{
    let run_started = Local::now();
    let cutoff = RetentionPolicy::new(backup_config.retention_years).cutoff(&run_started);

    let work_dir = create_work_dir(backup_config.temp_dump_root.as_deref())?;
    info!("📂 Work directory: {}", work_dir.path().display());
    debug!(
        "Retention: {} year(s), cutoff unix time {}",
        backup_config.retention_years, cutoff
    );

    let uploader = Uploader::new(store, backup_config.key_scheme, cutoff);
    let summary =
        logic::perform_backup_orchestration(archiver, &uploader, databases, tag, work_dir.path())
            .await;

    let work_dir_path = work_dir.path().to_path_buf();
    match work_dir.close() {
        Ok(()) => debug!("🧹 Removed work directory {}", work_dir_path.display()),
        Err(e) => warn!(
            "⚠️ Failed to remove work directory {}: {}",
            work_dir_path.display(),
            e
        ),
    }

    Ok(summary)
}

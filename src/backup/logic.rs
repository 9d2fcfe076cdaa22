// dbarchiver/src/backup/logic.rs
use std::path::Path;
use tracing::{error, info, warn};

use crate::backup::db_dump::{Archiver, validate_database_name};
use crate::backup::storage::ObjectStore;
use crate::backup::upload::{UploadReport, Uploader};
use crate::errors::BackupError;

/// How far a single target got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Invalid(String),
    ArchiveFailed(String),
    UploadFailed(String),
    Done(UploadReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub targets: Vec<(String, TargetOutcome)>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.targets
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TargetOutcome::Done(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.targets.len() - self.succeeded()
    }

    /// Retention deletions that could not be performed, across all targets.
    pub fn failed_deletions(&self) -> usize {
        self.targets
            .iter()
            .map(|(_, outcome)| match outcome {
                TargetOutcome::Done(report) => report.sweep.failed,
                _ => 0,
            })
            .sum()
    }

    pub fn log(&self) {
        info!(
            "📋 Backup summary: {} succeeded, {} failed",
            self.succeeded(),
            self.failed()
        );
        for (database, outcome) in &self.targets {
            match outcome {
                TargetOutcome::Done(report) => info!(
                    "   ✓ {} → {} (pruned {}, kept {})",
                    database,
                    report.key,
                    report.sweep.deleted,
                    report
                        .sweep
                        .listed
                        .saturating_sub(report.sweep.deleted + report.sweep.failed)
                ),
                TargetOutcome::Invalid(reason) => {
                    warn!("   ✗ {}: invalid target: {}", database, reason)
                }
                TargetOutcome::ArchiveFailed(reason) => {
                    warn!("   ✗ {}: dump failed: {}", database, reason)
                }
                TargetOutcome::UploadFailed(reason) => {
                    warn!("   ✗ {}: upload failed: {}", database, reason)
                }
            }
        }
        let failed_deletions = self.failed_deletions();
        if failed_deletions > 0 {
            warn!(
                "⚠️ {} expired archive(s) could not be deleted; they will be retried next run",
                failed_deletions
            );
        }
    }
}

fn log_failure(e: &BackupError) {
    error!("❌ {}", e);
    if let BackupError::Upload {
        diagnostic: Some(raw_response),
        ..
    } = e
    {
        error!("Raw storage response:\n{}", raw_response);
    }
}

/// Backs up every database in input order. A failing target is logged and
/// skipped; it never stops the targets after it.
pub async fn perform_backup_orchestration<A, S>(
    archiver: &A,
    uploader: &Uploader<'_, S>,
    databases: &[String],
    tag: Option<&str>,
    work_dir: &Path,
) -> RunSummary
where
    A: Archiver + ?Sized,
    S: ObjectStore + ?Sized,
{
    let mut summary = RunSummary::default();

    for (idx, database) in databases.iter().enumerate() {
        info!(
            "🚀 Starting backup {}/{}: `{}`",
            idx + 1,
            databases.len(),
            database
        );

        if let Err(e) = validate_database_name(database) {
            log_failure(&e);
            summary
                .targets
                .push((database.clone(), TargetOutcome::Invalid(e.to_string())));
            continue;
        }

        let archive_path = match archiver.archive(database, work_dir).await {
            Ok(path) => path,
            Err(e) => {
                log_failure(&e);
                summary
                    .targets
                    .push((database.clone(), TargetOutcome::ArchiveFailed(e.to_string())));
                continue;
            }
        };

        let outcome = match uploader.upload(database, &archive_path, tag).await {
            Ok(report) => TargetOutcome::Done(report),
            Err(e) => {
                log_failure(&e);
                TargetOutcome::UploadFailed(e.to_string())
            }
        };
        summary.targets.push((database.clone(), outcome));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::test_support::{LogCapture, MemoryStore, ScriptedArchiver};
    use crate::config::KeyScheme;

    fn names(databases: &[&str]) -> Vec<String> {
        databases.iter().map(|d| d.to_string()).collect()
    }

    #[tokio::test]
    async fn failed_dump_skips_upload_for_that_target_only() {
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        store.insert("beta/db_20100101_000000.dump", 1);
        let archiver = ScriptedArchiver::failing_for(&["beta"]);
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["alpha", "beta"]),
            None,
            work.path(),
        )
        .await;

        assert_eq!(archiver.calls(), vec!["alpha", "beta"]);
        assert!(work.path().join("alpha_db.dump").is_file());
        assert!(!work.path().join("beta_db.dump").exists());

        let puts = store.puts();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].starts_with("alpha/db_"));
        assert!(puts[0].ends_with(".dump"));
        // no sweep ran for beta, so its old archive survives
        assert_eq!(store.list_calls(), vec!["alpha/"]);
        assert!(store.contains("beta/db_20100101_000000.dump"));

        assert_eq!(summary.succeeded(), 1);
        assert!(matches!(
            summary.targets[1],
            (ref name, TargetOutcome::ArchiveFailed(_)) if name == "beta"
        ));
    }

    #[tokio::test]
    async fn failed_dump_is_logged_with_the_tool_output() {
        let logs = LogCapture::default();
        let _guard = logs.install();
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let archiver = ScriptedArchiver::failing_for(&["beta"]);
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["alpha", "beta"]),
            None,
            work.path(),
        )
        .await;
        summary.log();

        let output = logs.output();
        let failures: Vec<&str> = output.lines().filter(|l| l.contains("❌")).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("ERROR"));
        assert!(failures[0].contains(
            "Dump of database `beta` failed (exit status: 1): \
             Failed: error connecting to db `beta`"
        ));
        assert!(!output.contains("Dump of database `alpha`"));
        assert!(output.contains("✗ beta: dump failed:"));
        assert!(output.contains("✓ alpha → alpha/db_"));
        assert!(output.contains("1 succeeded, 1 failed"));
    }

    #[tokio::test]
    async fn upload_failure_does_not_stop_the_batch() {
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        store.fail_put();
        let archiver = ScriptedArchiver::default();
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["alpha", "beta"]),
            None,
            work.path(),
        )
        .await;

        assert_eq!(archiver.calls(), vec!["alpha", "beta"]);
        assert!(store.list_calls().is_empty());
        assert_eq!(summary.failed(), 2);
        assert!(
            summary
                .targets
                .iter()
                .all(|(_, outcome)| matches!(outcome, TargetOutcome::UploadFailed(_)))
        );
    }

    #[tokio::test]
    async fn invalid_names_are_never_archived() {
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let archiver = ScriptedArchiver::default();
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["", "bad/name", "gamma"]),
            None,
            work.path(),
        )
        .await;

        assert_eq!(archiver.calls(), vec!["gamma"]);
        assert_eq!(summary.targets.len(), 3);
        assert!(matches!(summary.targets[0].1, TargetOutcome::Invalid(_)));
        assert!(matches!(summary.targets[1].1, TargetOutcome::Invalid(_)));
        assert!(matches!(summary.targets[2].1, TargetOutcome::Done(_)));
    }

    #[tokio::test]
    async fn tagged_run_uploads_outside_the_swept_prefix() {
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        store.insert("alpha/db_20100101_000000.dump", 1);
        let archiver = ScriptedArchiver::default();
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["alpha"]),
            Some("release"),
            work.path(),
        )
        .await;

        let puts = store.puts();
        assert!(puts[0].starts_with("alpha_tag/release_"));
        assert_eq!(store.list_calls(), vec!["alpha/"]);
        assert!(!store.contains("alpha/db_20100101_000000.dump"));
        assert_eq!(summary.succeeded(), 1);
    }

    #[tokio::test]
    async fn failed_deletions_are_counted_in_the_summary() {
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        store.insert("alpha/db_20100101_000000.dump", 1);
        store.fail_delete_of("alpha/db_20100101_000000.dump");
        let archiver = ScriptedArchiver::default();
        let uploader = Uploader::new(&store, KeyScheme::Standard, 1_000);

        let summary = perform_backup_orchestration(
            &archiver,
            &uploader,
            &names(&["alpha"]),
            None,
            work.path(),
        )
        .await;

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed_deletions(), 1);
        assert_eq!(store.keys().len(), 2);
    }
}

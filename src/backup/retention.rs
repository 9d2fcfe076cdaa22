// dbarchiver/src/backup/retention.rs
//! Age-based pruning of remote archives.
//!
//! The cutoff is computed once per run. A sweep lists one database prefix,
//! keeps everything modified at or after the cutoff and deletes the rest.
//! Deletions are independent of each other: a failure is logged and the
//! sweep moves on, so an interrupted or partially failed sweep is simply
//! finished by the next run.

use chrono::{DateTime, Months, TimeZone, Utc};
use tracing::{info, warn};

use crate::backup::storage::{ObjectStore, RemoteObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub years: u32,
}

impl RetentionPolicy {
    pub fn new(years: u32) -> Self {
        RetentionPolicy { years }
    }

    /// `run_started` minus the retention window in calendar years, as a Unix
    /// timestamp. Feb 29 clamps to Feb 28 in non-leap years.
    pub fn cutoff<Tz: TimeZone>(&self, run_started: &DateTime<Tz>) -> i64 {
        run_started
            .clone()
            .checked_sub_months(Months::new(self.years.saturating_mul(12)))
            .map_or(i64::MIN, |t| t.timestamp())
    }
}

/// Objects strictly older than `cutoff`; an object modified exactly at the
/// cutoff is kept.
pub fn select_expired(objects: &[RemoteObject], cutoff: i64) -> Vec<&RemoteObject> {
    objects
        .iter()
        .filter(|object| object.last_modified < cutoff)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub listed: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub fn database_prefix(database: &str) -> String {
    format!("{}/", database)
}

/// Best-effort pruning of `database`'s archive history.
pub async fn sweep<S>(store: &S, database: &str, cutoff: i64) -> SweepReport
where
    S: ObjectStore + ?Sized,
{
    let prefix = database_prefix(database);
    let objects = match store.list_by_prefix(&prefix).await {
        Ok(objects) => objects,
        Err(e) => {
            warn!("⚠️ {}; nothing will be pruned for `{}` this run", e, database);
            return SweepReport::default();
        }
    };

    let mut report = SweepReport {
        listed: objects.len(),
        ..SweepReport::default()
    };

    for object in select_expired(&objects, cutoff) {
        info!(
            "🗑 Deleting expired archive `{}` (last modified {})",
            object.key,
            format_unix(object.last_modified)
        );
        match store.delete(&object.key).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!("⚠️ {}", e);
                report.failed += 1;
            }
        }
    }

    report
}

fn format_unix(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

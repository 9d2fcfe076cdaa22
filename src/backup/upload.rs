// dbarchiver/src/backup/upload.rs
use chrono::{Local, NaiveDateTime};
use std::path::Path;
use tracing::info;

use crate::backup::retention::{self, SweepReport};
use crate::backup::storage::ObjectStore;
use crate::config::KeyScheme;
use crate::errors::Result;

pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Remote key for an archive of `database` taken at local wall-clock time `taken_at`.
///
/// Tagged uploads live under `<db>_tag/` and are therefore outside the
/// prefix that retention sweeps.
pub fn build_key(
    database: &str,
    archive_path: &Path,
    tag: Option<&str>,
    key_scheme: KeyScheme,
    taken_at: NaiveDateTime,
) -> String {
    let timestamp = taken_at.format(KEY_TIMESTAMP_FORMAT);
    let ext = archive_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    match (tag, key_scheme) {
        (Some(tag), _) => format!("{}_tag/{}_{}{}", database, tag, timestamp, ext),
        (None, KeyScheme::Standard) => format!("{}/db_{}{}", database, timestamp, ext),
        (None, KeyScheme::Legacy) => {
            let stem = archive_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}/{}_{}{}", database, stem, timestamp, ext)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub key: String,
    pub sweep: SweepReport,
}

/// Sends archives to the bucket and prunes each database's history after a
/// successful transfer.
pub struct Uploader<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    key_scheme: KeyScheme,
    cutoff: i64,
}

impl<'a, S: ObjectStore + ?Sized> Uploader<'a, S> {
    pub fn new(store: &'a S, key_scheme: KeyScheme, cutoff: i64) -> Self {
        Uploader {
            store,
            key_scheme,
            cutoff,
        }
    }

    pub async fn upload(
        &self,
        database: &str,
        archive_path: &Path,
        tag: Option<&str>,
    ) -> Result<UploadReport> {
        let key = build_key(
            database,
            archive_path,
            tag,
            self.key_scheme,
            Local::now().naive_local(),
        );

        info!(
            "☁️ Uploading archive {} to {}/{}...",
            archive_path.display(),
            self.store.bucket_name(),
            key
        );
        self.store.put(archive_path, &key).await?;
        info!("✅ Uploaded `{}`", key);

        let sweep = retention::sweep(self.store, database, self.cutoff).await;
        Ok(UploadReport { key, sweep })
    }
}

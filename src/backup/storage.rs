// dbarchiver/src/backup/storage.rs
use async_trait::async_trait;
use std::path::Path;

use crate::errors::Result;

/// One stored archive as reported by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Unix timestamp, seconds.
    pub last_modified: i64,
}

/// The three bucket operations the backup pipeline relies on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket_name(&self) -> &str;

    /// Returns every object whose key starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Uploads `local_path` under `key`, replacing any existing object.
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

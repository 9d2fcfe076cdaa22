// dbarchiver/src/backup/s3_upload.rs
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::DisplayErrorContext;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::debug;

use crate::backup::storage::{ObjectStore, RemoteObject};
use crate::config::StorageConfig;
use crate::errors::{BackupError, Result};

/// S3-compatible bucket client, built once per run and shared by every target.
pub struct S3Storage {
    client: s3::Client,
    bucket_name: String,
}

impl S3Storage {
    pub async fn connect(storage_config: &StorageConfig) -> anyhow::Result<Self> {
        if storage_config.endpoint_url.trim().is_empty() {
            anyhow::bail!("Storage endpoint URL is empty; rebuild with BACKUP_ENDPOINT_URL set");
        }
        url::Url::parse(&storage_config.endpoint_url).with_context(|| {
            format!(
                "Storage endpoint URL is not valid: {}",
                storage_config.endpoint_url
            )
        })?;

        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&storage_config.endpoint_url)
            .region(Region::new(storage_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &storage_config.access_key_id,
                &storage_config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        debug!(
            "S3 client ready for bucket {} at {}",
            storage_config.bucket_name, storage_config.endpoint_url
        );
        Ok(S3Storage {
            client: s3::Client::new(&sdk_config),
            bucket_name: storage_config.bucket_name.clone(),
        })
    }
}

fn unix_seconds(timestamp: Option<&aws_smithy_types::DateTime>) -> i64 {
    // Objects without a timestamp are treated as brand new so they are never pruned.
    timestamp.map_or(i64::MAX, |t| t.secs())
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| BackupError::List {
                prefix: prefix.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    objects.push(RemoteObject {
                        key: key.to_string(),
                        last_modified: unix_seconds(object.last_modified()),
                    });
                }
            }
        }
        Ok(objects)
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| BackupError::Upload {
                key: key.to_string(),
                message: format!(
                    "Failed to read archive {}: {}",
                    local_path.display(),
                    e
                ),
                diagnostic: None,
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
                diagnostic: e.raw_response().map(|response| format!("{:#?}", response)),
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| BackupError::Delete {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

// In-memory stand-ins for the dump tool and the bucket.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::subscriber::DefaultGuard;

use crate::backup::db_dump::{Archiver, archive_path};
use crate::backup::storage::{ObjectStore, RemoteObject};
use crate::errors::{BackupError, Result};

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, i64>,
    puts: Vec<String>,
    deletes: Vec<String>,
    lists: Vec<String>,
    fail_put: bool,
    fail_list: bool,
    fail_delete: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock poisoned")
    }

    pub fn insert(&self, key: &str, last_modified: i64) {
        self.state().objects.insert(key.to_string(), last_modified);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn puts(&self) -> Vec<String> {
        self.state().puts.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    pub fn list_calls(&self) -> Vec<String> {
        self.state().lists.clone()
    }

    pub fn fail_put(&self) {
        self.state().fail_put = true;
    }

    pub fn fail_list(&self) {
        self.state().fail_list = true;
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.state().fail_delete.insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket_name(&self) -> &str {
        "memory"
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut state = self.state();
        state.lists.push(prefix.to_string());
        if state.fail_list {
            return Err(BackupError::List {
                prefix: prefix.to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, last_modified)| RemoteObject {
                key: key.clone(),
                last_modified: *last_modified,
            })
            .collect())
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_put {
            return Err(BackupError::Upload {
                key: key.to_string(),
                message: "service unavailable".to_string(),
                diagnostic: Some("HTTP/1.1 503 Slow Down".to_string()),
            });
        }
        if !local_path.is_file() {
            return Err(BackupError::Upload {
                key: key.to_string(),
                message: format!("{} is not a file", local_path.display()),
                diagnostic: None,
            });
        }
        state.puts.push(key.to_string());
        state.objects.insert(key.to_string(), Utc::now().timestamp());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_delete.contains(key) {
            return Err(BackupError::Delete {
                key: key.to_string(),
                message: "access denied".to_string(),
            });
        }
        state.objects.remove(key);
        state.deletes.push(key.to_string());
        Ok(())
    }
}

/// Writes a small file for every database except the ones told to fail.
#[derive(Default)]
pub struct ScriptedArchiver {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedArchiver {
    pub fn failing_for(databases: &[&str]) -> Self {
        ScriptedArchiver {
            failing: databases.iter().map(|d| d.to_string()).collect(),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("archiver lock poisoned").clone()
    }
}

#[async_trait]
impl Archiver for ScriptedArchiver {
    async fn archive(&self, database: &str, work_dir: &Path) -> Result<PathBuf> {
        self.calls
            .lock()
            .expect("archiver lock poisoned")
            .push(database.to_string());
        if self.failing.contains(database) {
            return Err(BackupError::Dump {
                database: database.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("Failed: error connecting to db `{}`", database),
            });
        }
        let path = archive_path(work_dir, database);
        std::fs::write(&path, database.as_bytes())?;
        Ok(path)
    }
}

/// Collects formatted log lines while its guard is alive.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buf.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

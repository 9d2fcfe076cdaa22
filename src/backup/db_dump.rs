// dbarchiver/src/backup/db_dump.rs
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use url::Url;
use which::which;

use crate::config::{BackupConfig, DumpTool};
use crate::errors::{BackupError, Result};

/// Produces one local archive file per database.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, database: &str, work_dir: &Path) -> Result<PathBuf>;
}

/// Where the archive of `database` lands inside the run's work directory.
pub fn archive_path(work_dir: &Path, database: &str) -> PathBuf {
    work_dir.join(format!("{}_db.dump", database))
}

/// Database names become file names and the leading segment of remote keys.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(BackupError::InvalidTarget {
            name: name.to_string(),
            reason: "database name is empty".to_string(),
        });
    }
    if name.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-') {
        return Err(BackupError::InvalidTarget {
            name: name.to_string(),
            reason: "only ASCII letters, digits, '_' and '-' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Runs `mongodump` or `pg_dump` as a child process.
#[derive(Debug, Clone)]
pub struct DumpToolArchiver {
    tool: DumpTool,
    executable: PathBuf,
    source_db_url: Option<String>,
}

// Helper function to find the dump executable
fn find_dump_executable(tool: DumpTool) -> anyhow::Result<PathBuf> {
    which(tool.executable_name()).with_context(|| {
        format!(
            "{} executable not found in PATH. Install the database client tools or set dump_tool_path in config.json.",
            tool.executable_name()
        )
    })
}

/// `full_url` pointed at `database`, keeping credentials and query parameters.
fn database_url(full_url: &str, database: &str) -> Result<String> {
    let mut parsed = Url::parse(full_url).map_err(|e| BackupError::InvalidTarget {
        name: database.to_string(),
        reason: format!("invalid source database URL: {}", e),
    })?;
    parsed.set_path(&format!("/{}", database));
    Ok(parsed.to_string())
}

/// Masks the password of any connection URL in `arg` so it can be logged.
fn redact_arg(arg: &str) -> String {
    let (flag, value) = match arg.split_once('=') {
        Some((flag, value)) if flag.starts_with("--") => (Some(flag), value),
        _ => (None, arg),
    };
    let redacted = match Url::parse(value) {
        Ok(mut url) if url.password().is_some() => {
            // set_password only fails for URLs that cannot carry credentials
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(_) => value.to_string(),
        // e.g. multi-host mongodb URIs the url crate rejects
        Err(_) => match (value.find("://"), value.rfind('@')) {
            (Some(start), Some(at)) if at > start => {
                let userinfo = &value[start + 3..at];
                match userinfo.split_once(':') {
                    Some((user, _)) => {
                        format!("{}{}:****{}", &value[..start + 3], user, &value[at..])
                    }
                    None => value.to_string(),
                }
            }
            _ => value.to_string(),
        },
    };
    match flag {
        Some(flag) => format!("{}={}", flag, redacted),
        None => redacted,
    }
}

impl DumpToolArchiver {
    pub fn new(tool: DumpTool, executable: PathBuf, source_db_url: Option<String>) -> Self {
        DumpToolArchiver {
            tool,
            executable,
            source_db_url,
        }
    }

    pub fn from_config(backup_config: &BackupConfig) -> anyhow::Result<Self> {
        let executable = match &backup_config.dump_tool_path {
            Some(path) => path.clone(),
            None => find_dump_executable(backup_config.dump_tool)?,
        };
        info!(
            "Using {} executable at: {}",
            backup_config.dump_tool.executable_name(),
            executable.display()
        );
        Ok(Self::new(
            backup_config.dump_tool,
            executable,
            backup_config.source_db_url.clone(),
        ))
    }

    /// Arguments selecting `database` and a binary archive written to `output`.
    pub fn command_args(&self, database: &str, output: &Path) -> Result<Vec<String>> {
        let mut args = Vec::new();
        match self.tool {
            DumpTool::Mongodump => {
                if let Some(uri) = &self.source_db_url {
                    args.push(format!("--uri={}", uri));
                }
                args.push("-d".to_string());
                args.push(database.to_string());
                args.push(format!("--archive={}", output.display()));
            }
            DumpTool::PgDump => {
                args.push("--format=custom".to_string());
                args.push("-f".to_string());
                args.push(output.display().to_string());
                match &self.source_db_url {
                    Some(url) => args.push(database_url(url, database)?),
                    None => args.push(database.to_string()),
                }
            }
        }
        Ok(args)
    }
}

#[async_trait]
impl Archiver for DumpToolArchiver {
    async fn archive(&self, database: &str, work_dir: &Path) -> Result<PathBuf> {
        validate_database_name(database)?;
        let output_path = archive_path(work_dir, database);
        let args = self.command_args(database, &output_path)?;

        info!(
            "📦 Archiving database `{}` to {}...",
            database,
            output_path.display()
        );
        debug!(
            "Running {} {:?}",
            self.executable.display(),
            args.iter().map(|a| redact_arg(a)).collect::<Vec<_>>()
        );

        // stdout stays attached to the terminal; only stderr is kept for diagnostics.
        let output = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BackupError::Dump {
                database: database.to_string(),
                status: "not started".to_string(),
                stderr: format!("failed to execute {}: {}", self.executable.display(), e),
            })?;

        if !output.status.success() {
            return Err(BackupError::Dump {
                database: database.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("✓ Database `{}` archived successfully", database);
        Ok(output_path)
    }
}

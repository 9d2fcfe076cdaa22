// dbarchiver/src/config/mod.rs
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

// Storage identity is bound at build time, e.g.
// `BACKUP_BUCKET_NAME=nightly cargo build --release`.
pub const ACCESS_KEY_ID: &str =
    or_placeholder(option_env!("BACKUP_ACCESS_KEY_ID"), "@AccessKeyId@");
pub const SECRET_ACCESS_KEY: &str =
    or_placeholder(option_env!("BACKUP_SECRET_ACCESS_KEY"), "@SecretAccessKey@");
pub const BUCKET_NAME: &str = or_placeholder(option_env!("BACKUP_BUCKET_NAME"), "@BucketName@");
pub const ENDPOINT_URL: &str = or_placeholder(option_env!("BACKUP_ENDPOINT_URL"), "@EndpointUrl@");
pub const REGION: &str = or_placeholder(option_env!("BACKUP_REGION"), "us-east-1");
pub const BUILD_ID: &str =
    or_placeholder(option_env!("BACKUP_BUILD_ID"), env!("CARGO_PKG_VERSION"));

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_RETENTION_YEARS: u32 = 2;

const fn or_placeholder(value: Option<&'static str>, placeholder: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => placeholder,
    }
}

/// Layout of the remote key for untagged uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// `<db>/db_<timestamp><ext>`
    #[default]
    Standard,
    /// `<db>/<archive stem>_<timestamp><ext>`
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpTool {
    #[default]
    Mongodump,
    PgDump,
}

impl DumpTool {
    pub fn executable_name(&self) -> &'static str {
        match self {
            DumpTool::Mongodump => "mongodump",
            DumpTool::PgDump => "pg_dump",
        }
    }
}

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub retention_years: Option<u32>,
    pub key_scheme: Option<KeyScheme>,
    pub dump_tool: Option<DumpTool>,
    pub dump_tool_path: Option<PathBuf>,
    pub source_database_url: Option<String>,
    pub temp_dump_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

impl StorageConfig {
    pub fn compiled_in() -> Self {
        StorageConfig {
            endpoint_url: ENDPOINT_URL.to_string(),
            region: REGION.to_string(),
            access_key_id: ACCESS_KEY_ID.to_string(),
            secret_access_key: SECRET_ACCESS_KEY.to_string(),
            bucket_name: BUCKET_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub retention_years: u32,
    pub key_scheme: KeyScheme,
    pub dump_tool: DumpTool,
    pub dump_tool_path: Option<PathBuf>,
    pub source_db_url: Option<String>,
    pub temp_dump_root: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            retention_years: DEFAULT_RETENTION_YEARS,
            key_scheme: KeyScheme::default(),
            dump_tool: DumpTool::default(),
            dump_tool_path: None,
            source_db_url: None,
            temp_dump_root: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_config: StorageConfig,
    pub backup_config: BackupConfig,
}

impl AppConfig {
    /// Loads the runtime settings file. A missing file is only tolerated when
    /// the caller fell back to the default location.
    pub fn load_from_json(config_path: &Path, explicitly_requested: bool) -> Result<Self> {
        let raw_json_config = if config_path.exists() {
            RawJsonConfig::from_path(config_path)?
        } else if explicitly_requested {
            anyhow::bail!("Config file {} does not exist", config_path.display());
        } else {
            RawJsonConfig::default()
        };

        Ok(AppConfig {
            storage_config: StorageConfig::compiled_in(),
            backup_config: load_backup_config_from_json(&raw_json_config)?,
        })
    }
}

impl RawJsonConfig {
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }
}

pub fn load_backup_config_from_json(raw_config: &RawJsonConfig) -> Result<BackupConfig> {
    let retention_years = raw_config.retention_years.unwrap_or(DEFAULT_RETENTION_YEARS);
    if retention_years == 0 {
        anyhow::bail!("retention_years in config.json must be at least 1");
    }

    let source_db_url = match raw_config.source_database_url.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(raw_url) => {
            Url::parse(raw_url).with_context(|| {
                format!("Invalid source_database_url in config.json: {}", raw_url)
            })?;
            Some(raw_url.to_string())
        }
    };

    let temp_dump_root = raw_config
        .temp_dump_root
        .clone()
        .filter(|p| !p.as_os_str().is_empty());

    Ok(BackupConfig {
        retention_years,
        key_scheme: raw_config.key_scheme.unwrap_or_default(),
        dump_tool: raw_config.dump_tool.unwrap_or_default(),
        dump_tool_path: raw_config.dump_tool_path.clone(),
        source_db_url,
        temp_dump_root,
    })
}

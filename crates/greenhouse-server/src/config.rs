//! Server configuration, loaded from `greenhouse.yml`

use greenhouse_ingest::IngestConfig;
use greenhouse_query::QueryServiceConfig;
use greenhouse_storage::{StorageEngineConfig, WalDurability};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "greenhouse.yml";

/// Complete server configuration - can be loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener and query protection
    pub server: ServerSettings,
    /// Measurement store
    pub storage: StorageSettings,
    /// Step ladder and target points
    pub query: QueryServiceConfig,
    /// Ingestion queue
    pub ingest: IngestConfig,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Server network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Query execution timeout in seconds
    pub query_timeout_secs: u64,
    /// Maximum number of concurrent queries
    pub max_concurrent_queries: usize,
    /// Directory of frontend files served at `/` (disabled when unset)
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            query_timeout_secs: 10,
            max_concurrent_queries: 32,
            static_dir: None,
        }
    }
}

/// Storage engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory
    pub data_dir: PathBuf,
    /// WAL directory (defaults to data_dir/wal)
    pub wal_dir: Option<PathBuf>,
    /// WAL durability mode: "every_write", "periodic", "os_default", "none"
    pub wal_durability: String,
    /// WAL periodic sync interval in milliseconds (only for "periodic" mode)
    pub wal_sync_interval_ms: u64,
    /// WAL file size that triggers rotation, in MB
    pub wal_max_file_size_mb: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_dir: None,
            wal_durability: "periodic".to_string(),
            wal_sync_interval_ms: 100,
            wal_max_file_size_mb: 64,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl LoggingSettings {
    /// Configured level; unknown names fall back to info
    pub fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to StorageEngineConfig
    pub fn to_storage_config(&self) -> StorageEngineConfig {
        let wal_durability = match self.storage.wal_durability.to_lowercase().as_str() {
            "every_write" | "every-write" | "every" => WalDurability::EveryWrite,
            "periodic" => WalDurability::Periodic {
                interval_ms: self.storage.wal_sync_interval_ms,
            },
            "os_default" | "os-default" | "os" => WalDurability::OsDefault,
            "none" => WalDurability::None,
            _ => WalDurability::default(),
        };

        StorageEngineConfig {
            data_dir: self.storage.data_dir.clone(),
            wal_dir: self.storage.wal_dir.clone(),
            wal_durability,
            wal_max_file_size: self.storage.wal_max_file_size_mb.max(1) * 1024 * 1024,
        }
    }

    /// Write default config to a file (for generating example config)
    pub fn write_default(path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

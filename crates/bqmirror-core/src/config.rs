//! Configuration schema (bqmirror.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on rows returned by the grouped column query
pub const DEFAULT_MAX_COLUMN_ROWS: usize = 10_000;

/// Which remote directory implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// Shell out to the `bq` command-line tool
    Cli,

    /// Call the BigQuery REST API directly (requires the `bigquery` feature)
    Api,
}

impl Default for RemoteBackend {
    fn default() -> Self {
        Self::Cli
    }
}

/// Remote directory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Backend implementation
    pub backend: RemoteBackend,

    /// `bq` executable (cli backend)
    pub bq_path: String,

    /// Project billed for queries (api backend)
    pub billing_project: Option<String>,

    /// Timeout applied to every remote call
    pub timeout_secs: u64,

    /// Row cap for the grouped column query
    pub max_column_rows: usize,

    /// Column fetches allowed in flight at once
    pub concurrency: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::default(),
            bq_path: "bq".to_string(),
            billing_project: None,
            timeout_secs: 60,
            max_column_rows: DEFAULT_MAX_COLUMN_ROWS,
            concurrency: 4,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local cache settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Override of the per-user store location
    pub path: Option<PathBuf>,
}

/// Diagnostic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Label shown when a successful dry run reports no byte count
    pub unknown_cost_label: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            unknown_cost_label: "N/A".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Config {
    /// Default config file name looked up in the working directory / workspace root
    pub const FILE_NAME: &'static str = "bqmirror.toml";

    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::Invalid("remote.timeout_secs must be positive".to_string()));
        }
        if self.remote.concurrency == 0 {
            return Err(ConfigError::Invalid("remote.concurrency must be positive".to_string()));
        }
        if self.remote.max_column_rows == 0 {
            return Err(ConfigError::Invalid("remote.max_column_rows must be positive".to_string()));
        }
        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

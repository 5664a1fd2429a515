//! Configuration schema (sourcefresh.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::env::EnvCaptureConfig;

/// Warehouse connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Warehouse type (postgres, mock)
    #[serde(rename = "type")]
    pub warehouse_type: String,

    /// Connection settings (warehouse-specific)
    #[serde(flatten)]
    pub settings: HashMap<String, String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            warehouse_type: "postgres".to_string(),
            settings: HashMap::new(),
        }
    }
}

impl WarehouseConfig {
    /// Look up a required setting
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.settings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingSetting {
                warehouse: self.warehouse_type.clone(),
                key: key.to_string(),
            })
    }
}

fn default_threads() -> usize {
    4
}

fn default_query_timeout_secs() -> u64 {
    300
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("target/manifest.json")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("target/sources.json")
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of concurrent freshness probes
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Per-query timeout; a probe exceeding it is reported as a runtime error
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Manifest location, relative to the project root
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Default report location, relative to the project root
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Custom environment capture for report metadata
    #[serde(default)]
    pub env_capture: EnvCaptureConfig,

    /// Warehouse connection configuration
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            query_timeout_secs: default_query_timeout_secs(),
            manifest_path: default_manifest_path(),
            output_path: default_output_path(),
            env_capture: EnvCaptureConfig::default(),
            warehouse: None,
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue("threads must be at least 1".to_string()));
        }
        if self.query_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "query_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a path against the project root unless it is absolute
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Warehouse '{warehouse}' requires '{key}' in warehouse settings")]
    MissingSetting { warehouse: String, key: String },
}

//! convoy.toml configuration parser.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Which backend holds the record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local maps; nothing survives a restart.
    Memory,
    /// One `<collection>.json` document per collection under `data_dir`.
    #[default]
    Json,
    /// Embedded redb document store at `<data_dir>/convoy.redb`.
    Redb,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "json" => Ok(Self::Json),
            "redb" => Ok(Self::Redb),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend {other:?} (expected memory, json or redb)"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Json => "json",
            Self::Redb => "redb",
        })
    }
}

/// What to do when a persisted collection cannot be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Surface the failure to the caller.
    #[default]
    Strict,
    /// Log a warning and start with an empty collection.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub load_policy: LoadPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: PathBuf::from("data"),
            load_policy: LoadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Log lines kept on each application record.
    pub application_log_retention: usize,
    /// Entries kept in the global log collection.
    pub log_retention: usize,
    /// Default `limit` for log queries.
    pub log_query_limit: usize,
    /// Default `limit` for GitOps deployment history queries.
    pub history_query_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            application_log_retention: 100,
            log_retention: 10_000,
            log_query_limit: 100,
            history_query_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub on_startup: bool,
    /// Seconds between background reconciliation passes; 0 disables the loop.
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            on_startup: true,
            interval_secs: 60,
        }
    }
}

impl ConvoyConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ConvoyConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.limits.application_log_retention == 0 || self.limits.log_retention == 0 {
            return Err(ConfigError::Invalid(
                "log retention limits must be at least 1".into(),
            ));
        }
        if self.storage.backend != BackendKind::Memory
            && self.storage.data_dir.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(format!(
                "storage.data_dir is required for the {} backend",
                self.storage.backend
            )));
        }
        Ok(())
    }
}

pub mod config;
pub mod types;

pub use config::{
    BackendKind, ConfigError, ConvoyConfig, LimitsConfig, LoadPolicy, ReconcileConfig,
    ServerConfig, StorageConfig,
};
pub use types::*;

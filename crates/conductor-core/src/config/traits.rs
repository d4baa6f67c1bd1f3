//! Server configuration storage traits

use std::collections::BTreeMap;
use std::sync::Weak;

use async_trait::async_trait;

use crate::types::ServerConfig;

/// Named server configs as loaded from storage
pub type ServerConfigMap = BTreeMap<String, ServerConfig>;

/// Persistent store of named tool-server configurations
///
/// Implementations:
/// - `MemoryConfigStorage`: In-memory for testing and embedding
/// - `FileConfigStorage`: YAML/JSON file, watched for external edits
/// - `PollingConfigStorage`: Database-style backend polled on an interval
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// Start change detection; `listener` is told when the stored set changes
    /// outside of this process
    async fn init(&self, listener: Weak<dyn ConfigChangeListener>) -> ConfigResult<()>;

    /// Load every stored config
    async fn load_all(&self) -> ConfigResult<ServerConfigMap>;

    /// Insert or replace a config
    async fn save(&self, name: &str, config: &ServerConfig) -> ConfigResult<()>;

    /// Delete a config
    async fn delete(&self, name: &str) -> ConfigResult<()>;

    /// Check whether a config is stored under `name`
    async fn has(&self, name: &str) -> ConfigResult<bool>;
}

/// Receiver of storage change notifications
#[async_trait]
pub trait ConfigChangeListener: Send + Sync {
    /// The stored configs changed; reload them
    async fn on_config_changed(&self);
}

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Server config not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Other(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

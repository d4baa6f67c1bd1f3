//! In-memory configuration storage

use std::sync::Weak;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::ServerConfig;
use super::traits::{ConfigChangeListener, ConfigError, ConfigResult, ConfigStorage, ServerConfigMap};

/// In-memory configuration storage
///
/// Never reports external changes: nothing outside the process can edit it.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    servers: RwLock<ServerConfigMap>,
}

impl MemoryConfigStorage {
    /// Create a new empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage with initial configs
    pub fn with_servers(servers: impl IntoIterator<Item = (String, ServerConfig)>) -> Self {
        Self {
            servers: RwLock::new(servers.into_iter().collect()),
        }
    }

    /// Number of stored configs
    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

#[async_trait]
impl ConfigStorage for MemoryConfigStorage {
    async fn init(&self, _listener: Weak<dyn ConfigChangeListener>) -> ConfigResult<()> {
        Ok(())
    }

    async fn load_all(&self) -> ConfigResult<ServerConfigMap> {
        Ok(self.servers.read().clone())
    }

    async fn save(&self, name: &str, config: &ServerConfig) -> ConfigResult<()> {
        self.servers.write().insert(name.to_string(), config.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> ConfigResult<()> {
        match self.servers.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(ConfigError::NotFound(name.to_string())),
        }
    }

    async fn has(&self, name: &str) -> ConfigResult<bool> {
        Ok(self.servers.read().contains_key(name))
    }
}

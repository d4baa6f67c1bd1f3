//! Connection registry
//!
//! Owns every `ToolConnection` and keeps the set in step with a
//! `ConfigStorage`. One registry is constructed per deployment and shared
//! behind an `Arc`; tests build isolated ones.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::config::{ConfigChangeListener, ConfigStorage, RuntimeSettings};
use crate::logging::Logger;
use crate::types::{ServerConfig, ToolDescriptor, ToolOutput};
use crate::{log_error, log_info, log_warn};
use super::connection::{ConnectionInfo, ToolConnection};
use super::error::{McpError, McpResult};
use super::transport::Connector;

/// Separator between server name and tool name in namespaced tool ids
pub const TOOL_ID_SEPARATOR: &str = "__";

/// Build the namespaced id of a server's tool
pub fn tool_id(server: &str, tool: &str) -> String {
    format!("{}{}{}", server, TOOL_ID_SEPARATOR, tool)
}

/// Check that a server name keeps namespaced tool ids unambiguous
pub fn validate_server_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("server name must not be empty".to_string());
    }
    if name.contains(TOOL_ID_SEPARATOR) {
        return Err(format!("server name {:?} must not contain {:?}", name, TOOL_ID_SEPARATOR));
    }
    Ok(())
}

fn validate_entry(name: &str, config: &ServerConfig) -> Result<(), String> {
    validate_server_name(name)?;
    config.validate()
}

/// A tool in the registry's namespaced union
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredTool {
    /// `{server}__{tool}`
    pub id: String,
    pub server: String,
    pub tool: ToolDescriptor,
}

/// Registry of tool server connections
pub struct ConnectionRegistry {
    storage: Arc<dyn ConfigStorage>,
    connector: Arc<dyn Connector>,
    settings: RuntimeSettings,
    clients: RwLock<HashMap<String, Arc<ToolConnection>>>,
    initialized: OnceCell<()>,
    me: Weak<ConnectionRegistry>,
    logger: Arc<dyn Logger>,
}

impl ConnectionRegistry {
    /// Create a registry; nothing is loaded until `init()`
    pub fn new(
        storage: Arc<dyn ConfigStorage>,
        connector: Arc<dyn Connector>,
        settings: RuntimeSettings,
        logger: Arc<dyn Logger>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            storage,
            connector,
            settings,
            clients: RwLock::new(HashMap::new()),
            initialized: OnceCell::new(),
            me: me.clone(),
            logger,
        })
    }

    /// Load every stored config and connect to all servers in parallel
    ///
    /// Concurrent calls wait for the same initialization.
    pub async fn init(&self) {
        self.initialized.get_or_init(|| self.load_from_storage()).await;
    }

    /// Check whether `init()` has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    async fn load_from_storage(&self) {
        let listener: Weak<dyn ConfigChangeListener> = self.me.clone();
        if let Err(e) = self.storage.init(listener).await {
            log_error!(self.logger, "[ConnectionRegistry] Storage init failed: {}", e);
        }

        let configs = match self.storage.load_all().await {
            Ok(configs) => configs,
            Err(e) => {
                log_error!(self.logger, "[ConnectionRegistry] Failed to load server configs: {}", e);
                return;
            }
        };
        log_info!(self.logger, "[ConnectionRegistry] Loading {} servers", configs.len());

        let connections: Vec<Arc<ToolConnection>> = configs
            .into_iter()
            .filter_map(|(name, config)| match validate_entry(&name, &config) {
                Ok(()) => Some(self.create(&name, config)),
                Err(e) => {
                    log_warn!(self.logger, "[ConnectionRegistry] Skipping '{}': {}", name, e);
                    None
                }
            })
            .collect();
        for connection in &connections {
            self.swap_in(Arc::clone(connection)).await;
        }
        join_all(connections.iter().map(|c| c.connect())).await;
    }

    fn create(&self, name: &str, config: ServerConfig) -> Arc<ToolConnection> {
        ToolConnection::new(
            name,
            config,
            Arc::clone(&self.connector),
            self.settings.clone(),
            Arc::clone(&self.logger),
        )
    }

    /// Put a connection in the map, tearing down whatever it replaces
    async fn swap_in(&self, connection: Arc<ToolConnection>) {
        let previous = self
            .clients
            .write()
            .insert(connection.name().to_string(), connection);
        if let Some(previous) = previous {
            previous.disconnect().await;
        }
    }

    async fn take_out(&self, name: &str) -> bool {
        let previous = self.clients.write().remove(name);
        match previous {
            Some(previous) => {
                previous.disconnect().await;
                true
            }
            None => false,
        }
    }

    fn spawn_connect(&self, connection: &Arc<ToolConnection>) {
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            connection.connect().await;
        });
    }

    /// Persist (if new) and connect a server, replacing any connection
    /// under the same name
    ///
    /// The connect runs in the background; await `connect()` on the returned
    /// connection to observe its outcome.
    pub async fn add_client(&self, name: &str, config: ServerConfig) -> McpResult<Arc<ToolConnection>> {
        validate_entry(name, &config).map_err(McpError::InvalidConfig)?;
        self.init().await;

        if !self.storage.has(name).await? {
            self.storage.save(name, &config).await?;
        }

        let connection = self.create(name, config);
        self.swap_in(Arc::clone(&connection)).await;
        self.spawn_connect(&connection);
        log_info!(self.logger, "[ConnectionRegistry] Added '{}'", name);
        Ok(connection)
    }

    /// Delete a server from storage and discard its connection
    pub async fn remove_client(&self, name: &str) -> McpResult<()> {
        self.init().await;

        if self.storage.has(name).await? {
            self.storage.delete(name).await?;
        }
        if self.take_out(name).await {
            log_info!(self.logger, "[ConnectionRegistry] Removed '{}'", name);
        }
        Ok(())
    }

    /// Reconnect a server
    ///
    /// With a config that differs from the current one, the new config is
    /// persisted and a fresh connection replaces the old. With the same
    /// config nothing happens. Without a config the existing connection is
    /// explicitly reconnected, or created from storage if absent.
    pub async fn refresh_client(
        &self,
        name: &str,
        config: Option<ServerConfig>,
    ) -> McpResult<Arc<ToolConnection>> {
        self.init().await;
        let current = self.client(name);

        match (current, config) {
            (Some(connection), Some(config)) if connection.config() == &config => Ok(connection),
            (_, Some(config)) => {
                validate_entry(name, &config).map_err(McpError::InvalidConfig)?;
                self.storage.save(name, &config).await?;
                Ok(self.replace_and_connect(name, config).await)
            }
            (Some(connection), None) => {
                log_info!(self.logger, "[ConnectionRegistry] Reconnecting '{}'", name);
                connection.disconnect().await;
                connection.connect().await;
                Ok(connection)
            }
            (None, None) => {
                let mut stored = self.storage.load_all().await?;
                let config = stored
                    .remove(name)
                    .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;
                validate_entry(name, &config).map_err(McpError::InvalidConfig)?;
                Ok(self.replace_and_connect(name, config).await)
            }
        }
    }

    async fn replace_and_connect(&self, name: &str, config: ServerConfig) -> Arc<ToolConnection> {
        let connection = self.create(name, config);
        self.swap_in(Arc::clone(&connection)).await;
        connection.connect().await;
        connection
    }

    /// Look up a connection by server name
    pub fn client(&self, name: &str) -> Option<Arc<ToolConnection>> {
        self.clients.read().get(name).cloned()
    }

    fn connections(&self) -> Vec<Arc<ToolConnection>> {
        let mut connections: Vec<_> = self.clients.read().values().cloned().collect();
        connections.sort_by(|a, b| a.name().cmp(b.name()));
        connections
    }

    /// Snapshots of every connection, sorted by name
    pub async fn get_clients(&self) -> Vec<ConnectionInfo> {
        self.init().await;
        self.connections().iter().map(|c| c.info()).collect()
    }

    /// Namespaced union of every available connection's tools
    pub async fn tools(&self) -> Vec<RegisteredTool> {
        self.init().await;
        self.connections()
            .iter()
            .filter(|c| c.offers_tools())
            .flat_map(|c| {
                let server = c.name().to_string();
                c.info().tools.into_iter().map(move |tool| RegisteredTool {
                    id: tool_id(&server, &tool.name),
                    server: server.clone(),
                    tool,
                })
            })
            .collect()
    }

    /// Call a tool on a named server
    pub async fn call_tool(&self, server: &str, tool: &str, input: Value) -> ToolOutput {
        self.init().await;
        match self.client(server) {
            Some(connection) => connection.call_tool(tool, input).await,
            None => {
                let error = McpError::ServerNotFound(server.to_string());
                ToolOutput::error(error.kind(), error.to_string())
            }
        }
    }

    /// Disconnect and discard every connection
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.clients.write().drain().map(|(_, c)| c).collect();
        log_info!(self.logger, "[ConnectionRegistry] Shutting down {} connections", connections.len());
        join_all(connections.iter().map(|c| c.disconnect())).await;
    }

    /// Shut down when the process receives Ctrl-C or SIGTERM
    pub fn shutdown_on_signal(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            wait_for_termination().await;
            if let Some(registry) = registry.upgrade() {
                registry.shutdown().await;
            }
        })
    }

    /// Bring the connection set in line with storage
    async fn reconcile(&self) {
        let stored = match self.storage.load_all().await {
            Ok(stored) => stored,
            Err(e) => {
                log_error!(self.logger, "[ConnectionRegistry] Reload failed: {}", e);
                return;
            }
        };

        let current: HashMap<String, ServerConfig> = self
            .connections()
            .iter()
            .map(|c| (c.name().to_string(), c.config().clone()))
            .collect();

        for name in current.keys().filter(|name| !stored.contains_key(*name)) {
            log_info!(self.logger, "[ConnectionRegistry] '{}' removed from storage", name);
            self.take_out(name).await;
        }

        let mut changed = Vec::new();
        for (name, config) in stored {
            if current.get(&name) == Some(&config) {
                continue;
            }
            if let Err(e) = validate_entry(&name, &config) {
                log_warn!(self.logger, "[ConnectionRegistry] Skipping '{}': {}", name, e);
                continue;
            }
            log_info!(self.logger, "[ConnectionRegistry] '{}' changed in storage", name);
            let connection = self.create(&name, config);
            self.swap_in(Arc::clone(&connection)).await;
            changed.push(connection);
        }
        join_all(changed.iter().map(|c| c.connect())).await;
    }
}

#[async_trait]
impl ConfigChangeListener for ConnectionRegistry {
    async fn on_config_changed(&self) {
        if !self.is_initialized() {
            return;
        }
        self.reconcile().await;
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.clients.read().keys().cloned().collect();
        f.debug_struct("ConnectionRegistry")
            .field("clients", &names)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

//! One named tool server connection
//!
//! Owns the connect/disconnect/call lifecycle for a single server. Failures
//! are captured on the connection rather than returned as errors, so the
//! registry can render partial availability.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::RuntimeSettings;
use crate::logging::Logger;
use crate::timer::DebounceTimer;
use crate::types::{ServerConfig, ToolDescriptor, ToolOutput};
use crate::{log_debug, log_info, log_warn};
use super::error::{McpError, McpResult};
use super::transport::{Connector, McpSession};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only snapshot of a connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub config: ServerConfig,
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub tools: Vec<ToolDescriptor>,
}

/// Outcome of a connect attempt
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connected(ConnectionInfo),
    Disconnected(Option<String>),
}

impl ConnectOutcome {
    /// Check whether the attempt left the connection connected
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

struct ConnectionState {
    status: ConnectionStatus,
    error: Option<String>,
    tools: Vec<ToolDescriptor>,
    session: Option<Arc<dyn McpSession>>,
    /// Disconnected by the idle timer; tools stay advertised and the
    /// session comes back on the next call
    parked: bool,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            error: None,
            tools: Vec::new(),
            session: None,
            parked: false,
        }
    }
}

/// Live connection to one tool server
pub struct ToolConnection {
    name: String,
    config: ServerConfig,
    connector: Arc<dyn Connector>,
    settings: RuntimeSettings,
    state: RwLock<ConnectionState>,
    connect_lock: Mutex<()>,
    attempts: AtomicU64,
    in_flight: AtomicUsize,
    idle: Option<DebounceTimer>,
    me: Weak<ToolConnection>,
    logger: Arc<dyn Logger>,
}

impl ToolConnection {
    /// Create a disconnected connection
    pub fn new(
        name: impl Into<String>,
        config: ServerConfig,
        connector: Arc<dyn Connector>,
        settings: RuntimeSettings,
        logger: Arc<dyn Logger>,
    ) -> Arc<Self> {
        let idle = settings.idle_timeout.map(DebounceTimer::new);
        Arc::new_cyclic(|me| Self {
            name: name.into(),
            config,
            connector,
            settings,
            state: RwLock::new(ConnectionState::new()),
            connect_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            idle,
            me: me.clone(),
            logger,
        })
    }

    /// Server name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server config
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    /// Check whether the connection is connected
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether this connection's tools belong in the registry's tool union
    ///
    /// True when connected, or when parked by the idle timer with the tool
    /// list from its last successful connect.
    pub fn offers_tools(&self) -> bool {
        let state = self.state.read();
        let live = state.status == ConnectionStatus::Connected || state.parked;
        live && !state.tools.is_empty()
    }

    /// Snapshot of name, config, status, error and tools
    pub fn info(&self) -> ConnectionInfo {
        let state = self.state.read();
        ConnectionInfo {
            name: self.name.clone(),
            config: self.config.clone(),
            status: state.status,
            error: state.error.clone(),
            tools: state.tools.clone(),
        }
    }

    fn outcome(&self) -> ConnectOutcome {
        let info = self.info();
        match info.status {
            ConnectionStatus::Connected => ConnectOutcome::Connected(info),
            _ => ConnectOutcome::Disconnected(info.error),
        }
    }

    /// Connect, or join the attempt already in flight
    ///
    /// Never fails: the outcome is also recorded on the connection.
    pub async fn connect(&self) -> ConnectOutcome {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.connect_lock.lock().await;

        // Another caller finished an attempt while we waited for the lock
        if self.attempts.load(Ordering::SeqCst) != seen || self.is_connected() {
            return self.outcome();
        }

        self.state.write().status = ConnectionStatus::Connecting;
        log_info!(self.logger, "[ToolConnection] Connecting '{}' ({})", self.name, self.config.transport());

        let timeout = self.settings.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout(timeout)),
        };

        match result {
            Ok((session, tools)) => {
                log_info!(self.logger, "[ToolConnection] '{}' connected with {} tools", self.name, tools.len());
                *self.state.write() = ConnectionState {
                    status: ConnectionStatus::Connected,
                    error: None,
                    tools,
                    session: Some(session),
                    parked: false,
                };
                self.touch();
            }
            Err(e) => {
                log_warn!(self.logger, "[ToolConnection] '{}' failed to connect: {}", self.name, e);
                *self.state.write() = ConnectionState {
                    error: Some(e.to_string()),
                    ..ConnectionState::new()
                };
            }
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn handshake(&self) -> McpResult<(Arc<dyn McpSession>, Vec<ToolDescriptor>)> {
        let session = self.connector.connect(&self.name, &self.config).await?;
        match session.list_tools().await {
            Ok(tools) => Ok((session, tools)),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    /// Disconnect after any in-flight connect finishes
    pub async fn disconnect(&self) {
        if let Some(idle) = &self.idle {
            idle.cancel();
        }
        let _guard = self.connect_lock.lock().await;
        let session = {
            let mut state = self.state.write();
            state.status = ConnectionStatus::Disconnected;
            state.parked = false;
            state.tools.clear();
            state.session.take()
        };
        if let Some(session) = session {
            log_info!(self.logger, "[ToolConnection] Disconnecting '{}'", self.name);
            session.close().await;
        }
    }

    /// Drop the session but keep the advertised tools
    async fn park(&self) {
        let _guard = self.connect_lock.lock().await;
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            drop(_guard);
            self.touch();
            return;
        }
        let session = {
            let mut state = self.state.write();
            if state.status != ConnectionStatus::Connected {
                return;
            }
            state.status = ConnectionStatus::Disconnected;
            state.parked = true;
            state.session.take()
        };
        if let Some(session) = session {
            log_info!(self.logger, "[ToolConnection] '{}' idle, disconnecting", self.name);
            session.close().await;
        }
    }

    /// Drop a session that reported its transport closed
    ///
    /// No-op when another caller already replaced it.
    async fn drop_session(&self, failed: &Arc<dyn McpSession>) {
        let _guard = self.connect_lock.lock().await;
        let session = {
            let mut state = self.state.write();
            match &state.session {
                Some(current) if Arc::ptr_eq(current, failed) => {
                    state.status = ConnectionStatus::Disconnected;
                    state.session.take()
                }
                _ => None,
            }
        };
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Reset the idle auto-disconnect window
    fn touch(&self) {
        let Some(idle) = &self.idle else {
            return;
        };
        let me = self.me.clone();
        idle.arm(move || async move {
            if let Some(connection) = me.upgrade() {
                connection.park().await;
            }
        });
    }

    fn session(&self) -> Option<Arc<dyn McpSession>> {
        let state = self.state.read();
        match state.status {
            ConnectionStatus::Connected => state.session.clone(),
            _ => None,
        }
    }

    async fn ensure_session(&self) -> McpResult<Arc<dyn McpSession>> {
        if let Some(session) = self.session() {
            return Ok(session);
        }
        match self.connect().await {
            ConnectOutcome::Connected(_) => self.session().ok_or(McpError::TransportClosed),
            ConnectOutcome::Disconnected(error) => Err(McpError::ConnectionFailed(
                error.unwrap_or_else(|| format!("'{}' is not connected", self.name)),
            )),
        }
    }

    async fn call_once(&self, tool: &str, input: Value) -> McpResult<Value> {
        let session = self.ensure_session().await?;
        self.touch();
        let result = session.call_tool(tool, input).await;
        self.touch();
        if matches!(&result, Err(e) if e.is_transport_closed()) {
            self.drop_session(&session).await;
        }
        result
    }

    /// Call a tool, connecting first if needed
    ///
    /// A closed transport earns one reconnect and retry; every other failure
    /// comes back as a structured error output.
    pub async fn call_tool(&self, tool: &str, input: Value) -> ToolOutput {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = match self.call_once(tool, input.clone()).await {
            Err(e) if e.is_transport_closed() => {
                log_warn!(self.logger, "[ToolConnection] '{}' closed during {}, reconnecting", self.name, tool);
                self.call_once(tool, input).await
            }
            other => other,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(value) => ToolOutput::Success(value),
            Err(e) => {
                log_debug!(self.logger, "[ToolConnection] {}.{} failed: {}", self.name, tool, e);
                ToolOutput::error(e.kind(), e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ToolConnection")
            .field("name", &self.name)
            .field("transport", &self.config.transport())
            .field("status", &state.status)
            .field("tools", &state.tools.len())
            .finish()
    }
}

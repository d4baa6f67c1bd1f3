//! Transport seam between connections and the MCP SDK

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ServerConfig, ToolDescriptor};
use super::error::McpResult;

/// Opens sessions to tool servers
///
/// `RmcpConnector` is the production implementation; tests inject scripted
/// connectors to count handshakes and simulate dropped transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the transport handshake for `config`
    async fn connect(&self, name: &str, config: &ServerConfig) -> McpResult<Arc<dyn McpSession>>;
}

/// One live, initialized session with a tool server
#[async_trait]
pub trait McpSession: Send + Sync {
    /// List the tools the server offers
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>>;

    /// Call a tool by name
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value>;

    /// Tear the session down; must be safe to call more than once
    async fn close(&self);
}

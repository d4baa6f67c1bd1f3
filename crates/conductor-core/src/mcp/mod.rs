//! Tool server connections over the Model Context Protocol
//!
//! `ToolConnection` owns one server's lifecycle, `ConnectionRegistry` owns
//! the set and keeps it in step with config storage. Transports sit behind
//! the `Connector` / `McpSession` traits; `RmcpConnector` is the production
//! implementation on top of the rmcp SDK.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor_core::config::{FileConfigStorage, RuntimeSettings};
//! use conductor_core::mcp::{ConnectionRegistry, RmcpConnector};
//!
//! let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
//! let registry = ConnectionRegistry::new(
//!     Arc::new(FileConfigStorage::user()),
//!     Arc::new(RmcpConnector::new(logger.clone())),
//!     RuntimeSettings::from_env(),
//!     logger,
//! );
//! registry.init().await;
//!
//! for tool in registry.tools().await {
//!     println!("{}: {}", tool.id, tool.tool.description);
//! }
//!
//! let output = registry.call_tool("files", "read_file", json!({ "path": "README.md" })).await;
//! ```

mod client;
mod connection;
mod error;
mod registry;
mod transport;

pub use client::{RmcpConnector, RmcpSession};
pub use connection::{ConnectOutcome, ConnectionInfo, ConnectionStatus, ToolConnection};
pub use error::{McpError, McpResult};
pub use registry::{tool_id, validate_server_name, ConnectionRegistry, RegisteredTool, TOOL_ID_SEPARATOR};
pub use transport::{Connector, McpSession};

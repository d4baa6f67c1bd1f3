//! MCP connection and tool-call errors

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// MCP client errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    TransportClosed,

    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("Tool reported an error: {0}")]
    ToolError(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Invalid server config: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// The one condition that earns a transparent reconnect-and-retry
    pub fn is_transport_closed(&self) -> bool {
        match self {
            McpError::TransportClosed => true,
            McpError::ToolCallFailed(message) | McpError::Protocol(message) => {
                message.to_lowercase().contains("connection closed")
            }
            _ => false,
        }
    }

    /// Error class name used in structured tool failures
    pub fn kind(&self) -> &'static str {
        match self {
            McpError::ConnectionFailed(_)
            | McpError::InitializationFailed(_)
            | McpError::Timeout(_)
            | McpError::TransportClosed => "ConnectionError",
            McpError::ToolCallFailed(_) => "ToolCallFailed",
            McpError::ToolError(_) => "ToolError",
            McpError::Protocol(_) => "ProtocolError",
            McpError::ServerNotFound(_) => "ServerNotFound",
            McpError::InvalidConfig(_) => "InvalidConfig",
            McpError::Storage(_) => "StorageError",
            McpError::Io(_) => "IoError",
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_closed_detection() {
        assert!(McpError::TransportClosed.is_transport_closed());
        assert!(McpError::ToolCallFailed("Connection closed by peer".into()).is_transport_closed());
        assert!(!McpError::ToolCallFailed("bad arguments".into()).is_transport_closed());
        assert!(!McpError::Timeout(Duration::from_secs(1)).is_transport_closed());
    }

    #[test]
    fn test_kind() {
        assert_eq!(McpError::Timeout(Duration::from_secs(1)).kind(), "ConnectionError");
        assert_eq!(McpError::ServerNotFound("x".into()).kind(), "ServerNotFound");
    }
}

//! Core types shared across the connection manager and the orchestrator

mod message;
mod server;
mod tool;

pub use message::{ChatMessage, MessageRole};
pub use server::{LocalServerConfig, RemoteServerConfig, ServerConfig};
pub use tool::{ToolDescriptor, ToolFailure, ToolOutput};

/// Cancellation token threaded from the chat layer into in-flight work
pub use tokio_util::sync::CancellationToken;

//! Capability lookup and execution errors

use thiserror::Error;

/// Errors raised while building the catalog or executing a capability
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("{name}: {message}")]
    RemoteTool { name: String, message: String },

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Built-in tool error: {0}")]
    Builtin(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Capability source unavailable: {0}")]
    Source(String),

    #[error("Cancelled")]
    Cancelled,
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

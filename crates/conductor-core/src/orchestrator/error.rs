//! Orchestration errors

use thiserror::Error;

use crate::capabilities::CapabilityError;
use crate::completion::CompletionError;

/// Errors that abort a whole orchestration run
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Query analysis failed: {0}")]
    Analysis(#[source] CompletionError),

    #[error("Planning failed: {0}")]
    Planning(#[source] CompletionError),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(#[source] CompletionError),

    #[error("Orchestration cancelled")]
    Cancelled,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors confined to a single step; recorded on the step, never propagated
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("Capability is not executable: {0}")]
    NotExecutable(String),

    #[error("Tool step has no capability id")]
    MissingCapability,

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

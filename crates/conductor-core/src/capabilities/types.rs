//! Capability model

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::types::CancellationToken;
use super::error::CapabilityResult;

/// Where a capability comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    RemoteTool,
    SavedWorkflow,
    BuiltIn,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::RemoteTool => write!(f, "remote-tool"),
            CapabilityKind::SavedWorkflow => write!(f, "saved-workflow"),
            CapabilityKind::BuiltIn => write!(f, "built-in"),
        }
    }
}

/// Back-reference to the thing a capability wraps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CapabilitySource {
    Remote { server: String, tool: String },
    Workflow { workflow_id: String },
    Builtin { toolkit: String, tool: String },
}

impl CapabilitySource {
    /// Kind implied by the source
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilitySource::Remote { .. } => CapabilityKind::RemoteTool,
            CapabilitySource::Workflow { .. } => CapabilityKind::SavedWorkflow,
            CapabilitySource::Builtin { .. } => CapabilityKind::BuiltIn,
        }
    }
}

/// Per-request context handed to sources and executors
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Caller identity, used to select executable workflows
    pub user_id: Option<String>,
    /// Caller cancellation
    pub cancel: CancellationToken,
}

impl CallContext {
    /// Anonymous context with a fresh token
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Use a caller-supplied cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Uniform execution surface every capability exposes
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    async fn execute(&self, inputs: Value, ctx: &CallContext) -> CapabilityResult<Value>;
}

/// A catalog entry the planner reasons about
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: CapabilityKind,
    pub category: String,
    pub source: CapabilitySource,
    pub input_schema: Option<Value>,
    #[serde(skip)]
    pub executor: Option<Arc<dyn CapabilityExecutor>>,
}

impl Capability {
    /// Check whether the capability can be executed
    pub fn is_executable(&self) -> bool {
        self.executor.is_some()
    }

    /// One-line description for prompts
    pub fn prompt_line(&self) -> String {
        format!("- {} [{}] ({}): {}", self.id, self.category, self.kind, self.description)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("executable", &self.is_executable())
            .finish()
    }
}

/// An immutable catalog snapshot
#[derive(Debug, Default)]
pub struct CapabilityCatalog {
    capabilities: Vec<Capability>,
}

impl CapabilityCatalog {
    /// Create a catalog
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// All capabilities in build order
    pub fn all(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Number of capabilities
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Look up by id
    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.id == id)
    }

    /// Capabilities whose category contains `category` (case-insensitive)
    pub fn by_category(&self, category: &str) -> Vec<&Capability> {
        let needle = category.to_lowercase();
        self.capabilities
            .iter()
            .filter(|c| c.category.to_lowercase().contains(&needle))
            .collect()
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for capability in &self.capabilities {
            if !categories.contains(&capability.category) {
                categories.push(capability.category.clone());
            }
        }
        categories
    }
}

//! Collaborators the catalog is built from

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::{ConnectionRegistry, RegisteredTool};
use crate::types::{CancellationToken, ToolOutput};
use super::error::CapabilityResult;
use super::types::CallContext;

/// Namespaced remote tools plus a way to call them
#[async_trait]
pub trait RemoteToolSource: Send + Sync {
    /// Current tool union
    async fn remote_tools(&self) -> CapabilityResult<Vec<RegisteredTool>>;

    /// Call one tool on one server
    async fn call_remote(&self, server: &str, tool: &str, input: Value) -> ToolOutput;
}

#[async_trait]
impl RemoteToolSource for ConnectionRegistry {
    async fn remote_tools(&self) -> CapabilityResult<Vec<RegisteredTool>> {
        Ok(self.tools().await)
    }

    async fn call_remote(&self, server: &str, tool: &str, input: Value) -> ToolOutput {
        self.call_tool(server, tool, input).await
    }
}

/// A saved workflow the caller may execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Saved-workflow store and executor
///
/// The workflow graph interpreter lives elsewhere; only its final result
/// is consumed here.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Workflows `user_id` is allowed to execute
    async fn executable_workflows(&self, user_id: Option<&str>) -> CapabilityResult<Vec<WorkflowSummary>>;

    /// Run a workflow to completion
    async fn execute(&self, workflow_id: &str, inputs: Value, ctx: &CallContext) -> CapabilityResult<Value>;
}

/// Per-invocation data for built-in tools
#[derive(Debug, Clone)]
pub struct BuiltinCall {
    /// Unique id of this invocation
    pub call_id: String,
    /// Fires when the caller aborts
    pub cancel: CancellationToken,
}

/// A tool implemented in-process
#[async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Toolkit this tool belongs to; used as its category
    fn toolkit(&self) -> &str;

    /// Tool name, unique across built-ins
    fn name(&self) -> &str;

    /// Human description
    fn description(&self) -> &str;

    /// JSON schema of the input object
    fn input_schema(&self) -> Value;

    /// Run the tool
    async fn call(&self, input: Value, call: BuiltinCall) -> CapabilityResult<Value>;
}

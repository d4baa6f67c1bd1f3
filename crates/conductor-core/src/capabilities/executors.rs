//! Executors bound to each capability kind at catalog-build time

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::error::{CapabilityError, CapabilityResult};
use super::sources::{BuiltinCall, BuiltinTool, RemoteToolSource, WorkflowSource};
use super::types::{CallContext, CapabilityExecutor};

/// Calls a tool on a remote server
pub struct RemoteToolExecutor {
    source: Arc<dyn RemoteToolSource>,
    server: String,
    tool: String,
}

impl RemoteToolExecutor {
    pub fn new(source: Arc<dyn RemoteToolSource>, server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            source,
            server: server.into(),
            tool: tool.into(),
        }
    }
}

#[async_trait]
impl CapabilityExecutor for RemoteToolExecutor {
    async fn execute(&self, inputs: Value, _ctx: &CallContext) -> CapabilityResult<Value> {
        self.source
            .call_remote(&self.server, &self.tool, inputs)
            .await
            .into_result()
            .map_err(|failure| CapabilityError::RemoteTool {
                name: failure.name,
                message: failure.message,
            })
    }
}

/// Runs a saved workflow
pub struct WorkflowExecutor {
    source: Arc<dyn WorkflowSource>,
    workflow_id: String,
}

impl WorkflowExecutor {
    pub fn new(source: Arc<dyn WorkflowSource>, workflow_id: impl Into<String>) -> Self {
        Self {
            source,
            workflow_id: workflow_id.into(),
        }
    }
}

#[async_trait]
impl CapabilityExecutor for WorkflowExecutor {
    async fn execute(&self, inputs: Value, ctx: &CallContext) -> CapabilityResult<Value> {
        self.source.execute(&self.workflow_id, inputs, ctx).await
    }
}

/// Calls a built-in tool with a fresh call id and abort signal
pub struct BuiltinExecutor {
    tool: Arc<dyn BuiltinTool>,
}

impl BuiltinExecutor {
    pub fn new(tool: Arc<dyn BuiltinTool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl CapabilityExecutor for BuiltinExecutor {
    async fn execute(&self, inputs: Value, ctx: &CallContext) -> CapabilityResult<Value> {
        let call = BuiltinCall {
            call_id: Uuid::new_v4().to_string(),
            cancel: ctx.cancel.child_token(),
        };
        self.tool.call(inputs, call).await
    }
}

//! Scripted collaborators shared by unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::capabilities::{
    BuiltinCall, BuiltinTool, CallContext, CapabilityError, CapabilityResult, RemoteToolSource, WorkflowSource,
    WorkflowSummary,
};
use crate::mcp::{tool_id, Connector, McpError, McpResult, McpSession, RegisteredTool};
use crate::types::{ServerConfig, ToolDescriptor, ToolOutput};

#[derive(Default)]
struct ServerScript {
    tools: Vec<ToolDescriptor>,
    failure: Option<String>,
    handshakes: usize,
    calls: Vec<(String, Value)>,
    close_next: usize,
    closed: usize,
}

type Scripts = Arc<Mutex<HashMap<String, ServerScript>>>;

/// Connector whose servers echo their input back
///
/// Counts handshakes, records calls, and can fail connects or report the
/// transport closed for the next N calls.
#[derive(Default)]
pub(crate) struct FakeConnector {
    scripts: Scripts,
    delay: Duration,
    call_delay: Duration,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, name: &str, tools: Vec<ToolDescriptor>) -> Self {
        self.scripts.lock().entry(name.to_string()).or_default().tools = tools;
        self
    }

    pub fn with_failure(self, name: &str, message: &str) -> Self {
        self.scripts.lock().entry(name.to_string()).or_default().failure = Some(message.to_string());
        self
    }

    /// Handshake latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Tool call latency
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn handshakes(&self, name: &str) -> usize {
        self.scripts.lock().get(name).map(|s| s.handshakes).unwrap_or(0)
    }

    pub fn calls(&self, name: &str) -> Vec<(String, Value)> {
        self.scripts.lock().get(name).map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn close_next_calls(&self, name: &str, n: usize) {
        self.scripts.lock().entry(name.to_string()).or_default().close_next = n;
    }

    pub fn closed(&self, name: &str) -> usize {
        self.scripts.lock().get(name).map(|s| s.closed).unwrap_or(0)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, name: &str, _config: &ServerConfig) -> McpResult<Arc<dyn McpSession>> {
        let failure = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(name) {
                Some(script) => {
                    script.handshakes += 1;
                    script.failure.clone()
                }
                None => Some(format!("no scripted server '{}'", name)),
            }
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = failure {
            return Err(McpError::ConnectionFailed(message));
        }
        Ok(Arc::new(FakeSession {
            server: name.to_string(),
            scripts: Arc::clone(&self.scripts),
            call_delay: self.call_delay,
            open: Mutex::new(true),
        }))
    }
}

struct FakeSession {
    server: String,
    scripts: Scripts,
    call_delay: Duration,
    open: Mutex<bool>,
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        Ok(self.scripts.lock().get(&self.server).map(|s| s.tools.clone()).unwrap_or_default())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        let mut scripts = self.scripts.lock();
        let script = scripts
            .get_mut(&self.server)
            .ok_or_else(|| McpError::ServerNotFound(self.server.clone()))?;
        if script.close_next > 0 {
            script.close_next -= 1;
            return Err(McpError::TransportClosed);
        }
        if !script.tools.iter().any(|t| t.name == name) {
            return Err(McpError::ToolError(format!("unknown tool '{}'", name)));
        }
        script.calls.push((name.to_string(), arguments.clone()));
        Ok(arguments)
    }

    async fn close(&self) {
        let was_open = std::mem::replace(&mut *self.open.lock(), false);
        if was_open {
            if let Some(script) = self.scripts.lock().get_mut(&self.server) {
                script.closed += 1;
            }
        }
    }
}

/// Remote tool source that counts fetches and echoes calls
pub(crate) struct CountingRemoteSource {
    tools: Vec<RegisteredTool>,
    delay: Duration,
    failing: bool,
    fetches: Mutex<usize>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl CountingRemoteSource {
    pub fn new(tools: Vec<(&str, ToolDescriptor)>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|(server, tool)| RegisteredTool {
                    id: tool_id(server, &tool.name),
                    server: server.to_string(),
                    tool,
                })
                .collect(),
            delay: Duration::ZERO,
            failing: false,
            fetches: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteToolSource for CountingRemoteSource {
    async fn remote_tools(&self) -> CapabilityResult<Vec<RegisteredTool>> {
        *self.fetches.lock() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing {
            return Err(CapabilityError::Source("remote tools unreachable".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn call_remote(&self, server: &str, tool: &str, input: Value) -> ToolOutput {
        self.calls.lock().push((server.to_string(), tool.to_string(), input.clone()));
        ToolOutput::Success(input)
    }
}

/// Workflow source that counts listings and records executions
pub(crate) struct CountingWorkflowSource {
    workflows: Vec<WorkflowSummary>,
    failing: bool,
    fetches: Mutex<usize>,
    executions: Mutex<Vec<String>>,
    last_user: Mutex<Option<String>>,
}

impl CountingWorkflowSource {
    pub fn new(workflows: Vec<WorkflowSummary>) -> Self {
        Self {
            workflows,
            failing: false,
            fetches: Mutex::new(0),
            executions: Mutex::new(Vec::new()),
            last_user: Mutex::new(None),
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }

    pub fn executions(&self) -> Vec<String> {
        self.executions.lock().clone()
    }

    pub fn last_user(&self) -> Option<String> {
        self.last_user.lock().clone()
    }
}

#[async_trait]
impl WorkflowSource for CountingWorkflowSource {
    async fn executable_workflows(&self, user_id: Option<&str>) -> CapabilityResult<Vec<WorkflowSummary>> {
        *self.fetches.lock() += 1;
        *self.last_user.lock() = user_id.map(str::to_string);
        if self.failing {
            return Err(CapabilityError::Source("workflow store unreachable".to_string()));
        }
        Ok(self.workflows.clone())
    }

    async fn execute(&self, workflow_id: &str, inputs: Value, ctx: &CallContext) -> CapabilityResult<Value> {
        self.executions.lock().push(workflow_id.to_string());
        *self.last_user.lock() = ctx.user_id.clone();
        Ok(serde_json::json!({ "workflowId": workflow_id, "inputs": inputs }))
    }
}

/// Built-in that records call ids and inputs, optionally failing or slow
pub(crate) struct RecordingBuiltin {
    toolkit: String,
    name: String,
    delay: Duration,
    failure: Option<String>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingBuiltin {
    pub fn new(toolkit: &str, name: &str) -> Self {
        Self {
            toolkit: toolkit.to_string(),
            name: name.to_string(),
            delay: Duration::ZERO,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BuiltinTool for RecordingBuiltin {
    fn toolkit(&self) -> &str {
        &self.toolkit
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Recording test tool"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn call(&self, input: Value, call: BuiltinCall) -> CapabilityResult<Value> {
        self.calls.lock().push((call.call_id, input.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(message) => Err(CapabilityError::Builtin(message.clone())),
            None => Ok(input),
        }
    }
}

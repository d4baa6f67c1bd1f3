//! Execution plan model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Tool,
    Analysis,
    Summary,
}

/// Step lifecycle
///
/// Steps whose dependencies never completed stay `Pending`; `Skipped` marks
/// steps abandoned by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One node of the plan DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub id: String,
    pub kind: StepKind,
    pub capability_id: Option<String>,
    pub description: String,
    pub inputs: Map<String, Value>,
    pub depends_on: Vec<String>,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ExecutionStep {
    /// Create a pending step
    pub fn new(id: impl Into<String>, kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            capability_id: None,
            description: description.into(),
            inputs: Map::new(),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Create a pending tool step
    pub fn tool(id: impl Into<String>, capability_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            capability_id: Some(capability_id.into()),
            ..Self::new(id, StepKind::Tool, description)
        }
    }

    /// Set static inputs
    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set dependencies
    pub fn with_depends_on(mut self, depends_on: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = depends_on.into_iter().map(Into::into).collect();
        self
    }

    /// Check whether the step completed
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// Step id for the `n`th step (1-based)
pub fn step_id(n: usize) -> String {
    format!("step_{}", n)
}

/// A plan for answering one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub query: String,
    pub steps: Vec<ExecutionStep>,
    pub estimated_steps: usize,
    pub confidence: f64,
    pub rationale: String,
}

impl ExecutionPlan {
    /// Create a plan; the estimate is the step count
    pub fn new(query: impl Into<String>, steps: Vec<ExecutionStep>, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            estimated_steps: steps.len(),
            steps,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The terminal summary step
    pub fn summary_step(&self) -> Option<&ExecutionStep> {
        self.steps.iter().rev().find(|s| s.kind == StepKind::Summary)
    }

    /// Tool steps in plan order
    pub fn tool_steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.steps.iter().filter(|s| s.kind == StepKind::Tool)
    }

    /// Steps that were dispatched (finished one way or the other)
    pub fn executed_steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Completed | StepStatus::Failed))
    }
}

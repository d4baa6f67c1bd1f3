//! Tool descriptor and tool call result types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool advertised by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name as known to its server
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

impl ToolDescriptor {
    /// Create a new tool descriptor with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_object_schema(),
        }
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Error half of a tool call outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Error class (e.g. `ConnectionError`, `ToolCallFailed`)
    pub name: String,
    /// Human-readable message
    pub message: String,
}

/// Outcome of a tool call
///
/// Tool calls never fail with `Err`: failures travel as data so callers can
/// render partial availability.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Raw result returned by the tool
    Success(Value),
    /// Structured failure
    Error(ToolFailure),
}

impl ToolOutput {
    /// Create a failure outcome
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        ToolOutput::Error(ToolFailure {
            name: name.into(),
            message: message.into(),
        })
    }

    /// Check if this outcome is a failure
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }

    /// Wire form: the raw result, or `{isError: true, error: {name, message}}`
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::Success(value) => value.clone(),
            ToolOutput::Error(failure) => json!({
                "isError": true,
                "error": {
                    "name": failure.name,
                    "message": failure.message,
                }
            }),
        }
    }

    /// Convert into a `Result`, for callers that do want `?`
    pub fn into_result(self) -> Result<Value, ToolFailure> {
        match self {
            ToolOutput::Success(value) => Ok(value),
            ToolOutput::Error(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let tool: ToolDescriptor = serde_json::from_value(json!({ "name": "ping" })).unwrap();
        assert_eq!(tool.name, "ping");
        assert_eq!(tool.input_schema, json!({ "type": "object" }));
    }

    #[test]
    fn test_error_wire_form() {
        let output = ToolOutput::error("ToolCallFailed", "boom");
        assert!(output.is_error());
        assert_eq!(
            output.to_value(),
            json!({ "isError": true, "error": { "name": "ToolCallFailed", "message": "boom" } })
        );
    }

    #[test]
    fn test_success_passthrough() {
        let output = ToolOutput::Success(json!({ "x": 42 }));
        assert!(!output.is_error());
        assert_eq!(output.into_result().unwrap(), json!({ "x": 42 }));
    }
}

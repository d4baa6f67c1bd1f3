//! Completion service trait definition

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::ChatMessage;
use super::error::{CompletionError, CompletionResult};

/// Model configuration for completion requests
#[derive(Debug, Clone)]
pub struct ProviderModelConfig {
    /// Model identifier, optionally provider-prefixed (`openai/gpt-4o-mini`)
    pub model: String,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
}

impl ProviderModelConfig {
    /// Create a new model config
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            api_base: None,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the API base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Provider prefix of the model string, if any
    pub fn provider(&self) -> Option<&str> {
        self.model.split_once('/').map(|(provider, _)| provider)
    }

    /// Model name without the provider prefix
    pub fn model_name(&self) -> &str {
        self.model
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.model)
    }
}

/// A prompt: optional system instruction plus conversation messages
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request from a single user prompt
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Self::default()
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Content of the last user message
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Named JSON schema for structured completions
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub name: String,
    pub schema: Value,
}

impl ObjectSchema {
    /// Create a schema from a raw JSON schema value
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Derive the schema of `T`
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> CompletionResult<Self> {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        Ok(Self::new(name, schema))
    }
}

/// Black-box language model access
///
/// Two operations: free text, and an object matching a JSON schema.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate free text
    async fn generate_text(&self, request: CompletionRequest) -> CompletionResult<String>;

    /// Generate a JSON object matching `schema`
    async fn generate_object(
        &self,
        request: CompletionRequest,
        schema: &ObjectSchema,
    ) -> CompletionResult<Value>;
}

/// Generate an object and deserialize it into `T`
pub async fn generate_typed<T>(
    service: &dyn CompletionService,
    name: &str,
    request: CompletionRequest,
) -> CompletionResult<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = ObjectSchema::of::<T>(name)?;
    let value = service.generate_object(request, &schema).await?;
    serde_json::from_value(value)
        .map_err(|e| CompletionError::invalid_response(format!("{} does not match schema: {}", name, e)))
}

/// Pull a JSON value out of model text, tolerating code fences and prose
pub fn extract_json(text: &str) -> CompletionResult<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str(inner) {
            return Ok(value);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| CompletionError::invalid_response(format!("no JSON object in response: {}", e))),
        _ => Err(CompletionError::invalid_response("no JSON object in response")),
    }
}

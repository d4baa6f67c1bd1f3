//! Mock completion service for testing
//!
//! Deterministic, scriptable responses without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::logging::{Logger, NoOpLogger};
use crate::log_debug;
use super::error::{CompletionError, CompletionResult};
use super::traits::{CompletionRequest, CompletionService, ObjectSchema};

/// Mock text mode
#[derive(Debug, Clone, Default)]
pub enum MockMode {
    /// Echo back the last user message
    #[default]
    Echo,
    /// Return a fixed response
    Fixed(String),
    /// Fail every text call
    Error(String),
}

/// A request as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Schema name for object requests, `None` for text
    pub schema: Option<String>,
    pub system: Option<String>,
    pub prompt: String,
}

/// Mock completion service
///
/// Text calls follow the configured `MockMode`; object calls pop the next
/// value queued under the schema's name and fail when none is left.
pub struct MockCompletionService {
    mode: MockMode,
    objects: Mutex<HashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    logger: Arc<dyn Logger>,
}

impl MockCompletionService {
    /// Create an echoing mock
    pub fn new() -> Self {
        Self::with_mode(MockMode::Echo)
    }

    /// Create with a specific text mode
    pub fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            objects: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Queue an object for the next request using `schema_name`
    pub fn with_object(self, schema_name: &str, value: Value) -> Self {
        self.push_object(schema_name, value);
        self
    }

    /// Queue an object for the next request using `schema_name`
    pub fn push_object(&self, schema_name: &str, value: Value) {
        self.objects
            .lock()
            .entry(schema_name.to_string())
            .or_default()
            .push_back(value);
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn record(&self, schema: Option<&ObjectSchema>, request: &CompletionRequest) {
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.requests.lock().push(RecordedRequest {
            schema: schema.map(|s| s.name.clone()),
            system: request.system.clone(),
            prompt,
        });
    }
}

impl Default for MockCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn generate_text(&self, request: CompletionRequest) -> CompletionResult<String> {
        self.record(None, &request);
        log_debug!(self.logger, "[MockCompletionService] generate_text ({:?})", self.mode);

        match &self.mode {
            MockMode::Echo => Ok(request.last_user_text().unwrap_or_default().to_string()),
            MockMode::Fixed(text) => Ok(text.clone()),
            MockMode::Error(message) => Err(CompletionError::api_error("mock", message.clone())),
        }
    }

    async fn generate_object(
        &self,
        request: CompletionRequest,
        schema: &ObjectSchema,
    ) -> CompletionResult<Value> {
        self.record(Some(schema), &request);
        log_debug!(self.logger, "[MockCompletionService] generate_object '{}'", schema.name);

        self.objects
            .lock()
            .get_mut(&schema.name)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| CompletionError::invalid_response(format!("no scripted object for '{}'", schema.name)))
    }
}

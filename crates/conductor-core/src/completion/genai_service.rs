//! GenaiCompletionService - completion service over the genai crate

use std::sync::Arc;

use async_trait::async_trait;
use genai::Client;
use serde_json::Value;

use crate::logging::Logger;
use crate::{log_debug, log_info};
use super::error::{CompletionError, CompletionResult};
use super::genai_adapter::{create_client, to_genai_options, to_genai_request};
use super::traits::{extract_json, CompletionRequest, CompletionService, ObjectSchema, ProviderModelConfig};

/// Completion service for any genai-supported provider
pub struct GenaiCompletionService {
    config: ProviderModelConfig,
    client: Client,
    logger: Arc<dyn Logger>,
}

impl GenaiCompletionService {
    /// Create a service for one model
    pub fn new(config: ProviderModelConfig, logger: Arc<dyn Logger>) -> Self {
        let client = create_client(&config);
        Self { config, client, logger }
    }

    /// Model config in use
    pub fn config(&self) -> &ProviderModelConfig {
        &self.config
    }

    fn provider_label(&self) -> String {
        self.config.provider().unwrap_or("genai").to_string()
    }

    async fn exec(&self, request: CompletionRequest, schema: Option<&ObjectSchema>) -> CompletionResult<String> {
        let options = to_genai_options(&request, schema);
        let chat_req = to_genai_request(request);
        let model_name = self.config.model_name();

        log_debug!(
            self.logger,
            "[GenaiCompletionService] exec_chat model={} structured={}",
            model_name,
            schema.is_some()
        );

        let response = self
            .client
            .exec_chat(model_name, chat_req, Some(&options))
            .await
            .map_err(|e| CompletionError::api_error(self.provider_label(), e.to_string()))?;

        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::invalid_response("empty completion"))
    }
}

#[async_trait]
impl CompletionService for GenaiCompletionService {
    async fn generate_text(&self, request: CompletionRequest) -> CompletionResult<String> {
        let text = self.exec(request, None).await?;
        log_info!(self.logger, "[GenaiCompletionService] Generated {} chars", text.len());
        Ok(text)
    }

    async fn generate_object(
        &self,
        mut request: CompletionRequest,
        schema: &ObjectSchema,
    ) -> CompletionResult<Value> {
        // Not every adapter honours response formats; spell the schema out too
        let instruction = format!(
            "Respond with a single JSON object matching this JSON schema ({}):\n{}",
            schema.name,
            serde_json::to_string(&schema.schema)?
        );
        request.system = Some(match request.system.take() {
            Some(system) => format!("{}\n\n{}", system, instruction),
            None => instruction,
        });

        let text = self.exec(request, Some(schema)).await?;
        let value = extract_json(&text)?;
        log_info!(self.logger, "[GenaiCompletionService] Generated object '{}'", schema.name);
        Ok(value)
    }
}

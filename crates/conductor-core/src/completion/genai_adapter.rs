//! Adapter between conductor-core types and genai types
//!
//! Auth resolution order: explicit key on the model config, then the
//! provider's conventional environment variable, then genai's own defaults.

use std::future::Future;
use std::pin::Pin;

use genai::chat::{
    ChatMessage as GenaiMessage, ChatOptions as GenaiOptions, ChatRequest, ChatResponseFormat,
    ChatRole as GenaiRole, JsonSpec, MessageContent as GenaiContent,
};
use genai::resolver::{AuthData, AuthResolver, Endpoint, ServiceTargetResolver};
use genai::{adapter::AdapterKind, Client, ModelIden, ServiceTarget};

use crate::types::{ChatMessage, MessageRole};
use super::traits::{CompletionRequest, ObjectSchema, ProviderModelConfig};

/// Convert MessageRole to genai ChatRole
pub fn to_genai_role(role: MessageRole) -> GenaiRole {
    match role {
        MessageRole::System => GenaiRole::System,
        MessageRole::User => GenaiRole::User,
        MessageRole::Assistant => GenaiRole::Assistant,
    }
}

/// Convert ChatMessage to genai ChatMessage
pub fn to_genai_message(msg: ChatMessage) -> GenaiMessage {
    let content = GenaiContent::from(msg.content);
    match msg.role {
        MessageRole::System => GenaiMessage::system(content),
        MessageRole::User => GenaiMessage::user(content),
        MessageRole::Assistant => GenaiMessage::assistant(content),
    }
}

/// Build a genai request from a completion request
pub fn to_genai_request(request: CompletionRequest) -> ChatRequest {
    let messages = request.messages.into_iter().map(to_genai_message).collect();
    let mut chat_req = ChatRequest::new(messages);
    if let Some(system) = request.system {
        chat_req = chat_req.with_system(system);
    }
    chat_req
}

/// Chat options for a request, with a JSON response format when a schema is given
pub fn to_genai_options(request: &CompletionRequest, schema: Option<&ObjectSchema>) -> GenaiOptions {
    let mut genai_opts = GenaiOptions::default();

    if let Some(temp) = request.temperature {
        genai_opts = genai_opts.with_temperature(temp as f64);
    }
    if let Some(schema) = schema {
        genai_opts = genai_opts.with_response_format(ChatResponseFormat::JsonSpec(JsonSpec::new(
            schema.name.clone(),
            schema.schema.clone(),
        )));
    }

    genai_opts
}

/// Conventional environment variable holding a provider's API key
pub fn provider_to_env_key(provider: &str) -> String {
    match provider.to_lowercase().as_str() {
        "gemini" | "google" => "GEMINI_API_KEY".to_string(),
        "azure" => "AZURE_OPENAI_API_KEY".to_string(),
        "xai" => "XAI_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.to_uppercase().replace('-', "_")),
    }
}

/// Environment variable for a genai adapter kind
pub fn adapter_kind_to_env_key(adapter: AdapterKind) -> String {
    match adapter {
        AdapterKind::OpenAI => "OPENAI_API_KEY".to_string(),
        AdapterKind::Anthropic => "ANTHROPIC_API_KEY".to_string(),
        AdapterKind::Gemini => "GEMINI_API_KEY".to_string(),
        AdapterKind::Groq => "GROQ_API_KEY".to_string(),
        AdapterKind::Xai => "XAI_API_KEY".to_string(),
        AdapterKind::DeepSeek => "DEEPSEEK_API_KEY".to_string(),
        AdapterKind::Cohere => "COHERE_API_KEY".to_string(),
        _ => format!("{:?}_API_KEY", adapter).to_uppercase(),
    }
}

/// Create a genai Client for a model config
pub fn create_client(config: &ProviderModelConfig) -> Client {
    let provider = config.provider().unwrap_or_default().to_string();
    let explicit_key = config.api_key.clone();
    let api_base = config.api_base.clone();

    let auth_provider = provider.clone();
    let auth_resolver = AuthResolver::from_resolver_async_fn(
        move |model_iden: ModelIden| -> Pin<Box<dyn Future<Output = genai::resolver::Result<Option<AuthData>>> + Send>> {
            let explicit_key = explicit_key.clone();
            let env_key = if auth_provider.is_empty() {
                adapter_kind_to_env_key(model_iden.adapter_kind)
            } else {
                provider_to_env_key(&auth_provider)
            };

            Box::pin(async move {
                if let Some(key) = explicit_key {
                    return Ok(Some(AuthData::from_single(key)));
                }
                // None lets genai fall back to its own lookup (fine for Ollama)
                Ok(std::env::var(&env_key).ok().map(AuthData::from_single))
            })
        },
    );

    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let endpoint = match (provider.as_str(), api_base.as_ref()) {
                (_, Some(base)) => Endpoint::from_owned(base.clone()),
                ("openrouter", None) => Endpoint::from_static("https://openrouter.ai/api/v1/"),
                ("mistral", None) => Endpoint::from_static("https://api.mistral.ai/v1/"),
                // Native genai providers resolve normally
                _ => return Ok(target),
            };

            let adapter_kind = if is_genai_native(&provider) {
                target.model.adapter_kind
            } else {
                AdapterKind::OpenAI
            };
            let model = ModelIden::new(adapter_kind, target.model.model_name.clone());

            Ok(ServiceTarget {
                endpoint,
                auth: target.auth,
                model,
            })
        },
    );

    Client::builder()
        .with_auth_resolver(auth_resolver)
        .with_service_target_resolver(target_resolver)
        .build()
}

/// Check if a provider is natively supported by genai
pub fn is_genai_native(provider: &str) -> bool {
    matches!(
        provider.to_lowercase().as_str(),
        "openai"
            | "anthropic"
            | "gemini"
            | "ollama"
            | "groq"
            | "xai"
            | "deepseek"
            | "cohere"
            | "fireworks"
            | "together"
    )
}

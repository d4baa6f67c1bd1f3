//! Language model completion
//!
//! The orchestrator needs two things from a model: free text, and a JSON
//! object matching a schema. `GenaiCompletionService` provides both for
//! every provider genai supports; `MockCompletionService` scripts them for
//! tests.

mod error;
mod genai_adapter;
mod genai_service;
mod mock;
mod traits;

pub use error::{CompletionError, CompletionResult};
pub use genai_adapter::{is_genai_native, provider_to_env_key};
pub use genai_service::GenaiCompletionService;
pub use mock::{MockCompletionService, MockMode, RecordedRequest};
pub use traits::{
    extract_json, generate_typed, CompletionRequest, CompletionService, ObjectSchema,
    ProviderModelConfig,
};

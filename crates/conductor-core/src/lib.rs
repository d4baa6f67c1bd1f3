//! Conductor Core
//!
//! Runtime-agnostic tool-connection manager and capability orchestration.
//! The host (CLI, server, bindings) installs logging and owns the runtime;
//! this crate never reads process arguments or sets global state.
//!
//! ## Tool connections
//!
//! The `mcp` module keeps one lazily connected session per configured tool
//! server and exposes the union of their tools under namespaced ids:
//!
//! ```rust,ignore
//! use conductor_core::{ConnectionRegistry, FileConfigStorage, RmcpConnector, RuntimeSettings};
//!
//! let storage = Arc::new(FileConfigStorage::user());
//! let registry = ConnectionRegistry::new(storage, Arc::new(RmcpConnector::new(logger.clone())), RuntimeSettings::from_env(), logger);
//! registry.init().await;
//! let tools = registry.tools().await;
//! ```
//!
//! ## Orchestration
//!
//! The `capabilities` module turns remote tools, saved workflows and
//! built-in tools into one catalog; the `orchestrator` module plans and runs
//! queries against it:
//!
//! ```rust,ignore
//! use conductor_core::{CallContext, CapabilityRegistry, Orchestrator};
//!
//! let capabilities = Arc::new(CapabilityRegistry::new().with_remote_tools(registry.clone()));
//! let orchestrator = Orchestrator::new(capabilities, completion);
//! let result = orchestrator.orchestrate("ping 42 and summarize", &CallContext::new()).await?;
//! ```

pub mod types;
pub mod logging;
pub mod config;
pub mod timer;
pub mod mcp;
pub mod completion;
pub mod capabilities;
pub mod builtin;
pub mod orchestrator;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use types::{
    CancellationToken, ChatMessage, LocalServerConfig, MessageRole, RemoteServerConfig, ServerConfig,
    ToolDescriptor, ToolFailure, ToolOutput,
};

pub use logging::{CaptureLogger, ConsoleLogger, LogLevel, Logger, NoOpLogger, SharedLogger, TracingLogger};

pub use config::{
    ConfigChangeListener, ConfigError, ConfigResult, ConfigStorage, FileConfigStorage,
    MemoryConfigStorage, PollingConfigStorage, RuntimeSettings,
};

pub use timer::DebounceTimer;

pub use mcp::{
    ConnectOutcome, ConnectionInfo, ConnectionRegistry, ConnectionStatus, Connector, McpError,
    McpResult, McpSession, RegisteredTool, RmcpConnector, ToolConnection,
};

pub use completion::{
    CompletionError, CompletionRequest, CompletionResult, CompletionService, GenaiCompletionService,
    MockCompletionService, ProviderModelConfig,
};

pub use capabilities::{
    BuiltinTool, CallContext, Capability, CapabilityCatalog, CapabilityError, CapabilityKind,
    CapabilityRegistry, Categorizer, KeywordCategorizer, WorkflowSource,
};

pub use builtin::default_builtins;

pub use orchestrator::{
    ExecutionPlan, ExecutionPlanner, ExecutionStep, OrchestrationResult, Orchestrator,
    OrchestratorError, OrchestratorResult, QueryAnalysis, QueryAnalyzer, StepKind, StepStatus,
};

//! Server configuration storage and runtime settings
//!
//! Storage backends:
//! - `MemoryConfigStorage`: In-memory for testing
//! - `FileConfigStorage`: YAML/JSON file with change watching
//! - `PollingConfigStorage`: Database-style backend polled on an interval

mod traits;
mod memory;
mod file;
mod polling;
mod settings;

pub use traits::{ConfigChangeListener, ConfigError, ConfigResult, ConfigStorage, ServerConfigMap};
pub use memory::MemoryConfigStorage;
pub use file::{FileConfigStorage, FileFormat, ServerFile};
pub use polling::{ConfigBackend, MemoryConfigBackend, PollingConfigStorage};
pub use settings::{
    RuntimeSettings, DEFAULT_CAPABILITY_TTL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_POLL_INTERVAL, DEFAULT_RELOAD_DEBOUNCE, SERVERLESS_CONNECT_TIMEOUT,
};

//! Injected logging
//!
//! Components take an `Arc<dyn Logger>` and never install a global
//! subscriber. Hosts pick `TracingLogger` (structured output through their
//! subscriber) or `ConsoleLogger`; tests use `NoOpLogger` or
//! `CaptureLogger`.

mod traits;
mod noop;
mod console;
mod tracing_logger;

pub use traits::{Logger, SharedLogger};
pub use noop::{CaptureLogger, NoOpLogger};
pub use console::{ConsoleLogger, LogLevel};
pub use tracing_logger::TracingLogger;

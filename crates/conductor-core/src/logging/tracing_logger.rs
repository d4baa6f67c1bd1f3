//! Logger that forwards to `tracing`

use super::traits::Logger;

/// A logger that emits `tracing` events under the `conductor` target
///
/// Hosts decide where the events go by installing a subscriber; the core
/// never installs one itself.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    component: String,
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingLogger {
    /// Create a tracing logger for the core
    pub fn new() -> Self {
        Self {
            component: "core".to_string(),
        }
    }

    /// Create a tracing logger tagged with a component name
    pub fn for_component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "conductor", component = %self.component, "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "conductor", component = %self.component, "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "conductor", component = %self.component, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "conductor", component = %self.component, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_logger_without_subscriber() {
        // No subscriber installed: events are dropped, nothing panics
        let logger = TracingLogger::for_component("registry");
        assert_eq!(logger.component, "registry");
        logger.debug("debug message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");
    }
}

//! Logger trait and formatting macros

use std::sync::Arc;

/// Sink for the core's log lines
///
/// Lines carry their component in brackets, e.g.
/// `[ConnectionRegistry] Loaded 3 servers`.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);

    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);
}

/// Logger handle passed between components
pub type SharedLogger = Arc<dyn Logger>;

/// `log_debug!(logger, "[Component] fmt", args..)`
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
    };
}

/// `log_info!(logger, "[Component] fmt", args..)`
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
    };
}

/// `log_warn!(logger, "[Component] fmt", args..)`
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
    };
}

/// `log_error!(logger, "[Component] fmt", args..)`
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*))
    };
}

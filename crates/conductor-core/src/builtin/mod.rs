//! Built-in tools shipped with the core

mod chart;
mod http;

use std::sync::Arc;

use crate::capabilities::BuiltinTool;

pub use chart::{ChartInput, ChartSeries, ChartTool, ChartType};
pub use http::{HttpFetchInput, HttpFetchTool, HttpMethod, MAX_BODY_BYTES};

/// Every shipped built-in tool
pub fn default_builtins() -> Vec<Arc<dyn BuiltinTool>> {
    vec![Arc::new(ChartTool::new()), Arc::new(HttpFetchTool::new())]
}

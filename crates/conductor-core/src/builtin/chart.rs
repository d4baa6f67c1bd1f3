//! Chart toolkit: turns labelled series into a chart spec the UI renders

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::capabilities::{BuiltinCall, BuiltinTool, CapabilityError, CapabilityResult};

/// Supported chart shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
}

/// One named data series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<f64>,
}

/// Chart tool input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartInput {
    #[serde(default)]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: Option<String>,
    /// X-axis labels (or slice labels for pie charts)
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

impl ChartInput {
    fn validate(&self) -> CapabilityResult<()> {
        if self.labels.is_empty() {
            return Err(CapabilityError::InvalidInput("chart needs at least one label".into()));
        }
        if self.series.is_empty() {
            return Err(CapabilityError::InvalidInput("chart needs at least one series".into()));
        }
        if self.chart_type == ChartType::Pie && self.series.len() > 1 {
            return Err(CapabilityError::InvalidInput("pie charts take a single series".into()));
        }
        for series in &self.series {
            if series.data.len() != self.labels.len() {
                return Err(CapabilityError::InvalidInput(format!(
                    "series '{}' has {} points for {} labels",
                    series.name,
                    series.data.len(),
                    self.labels.len()
                )));
            }
            if series.data.iter().any(|v| !v.is_finite()) {
                return Err(CapabilityError::InvalidInput(format!(
                    "series '{}' contains non-finite values",
                    series.name
                )));
            }
        }
        Ok(())
    }
}

/// Builds chart specifications
#[derive(Debug, Default)]
pub struct ChartTool;

impl ChartTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuiltinTool for ChartTool {
    fn toolkit(&self) -> &str {
        "chart"
    }

    fn name(&self) -> &str {
        "chart"
    }

    fn description(&self) -> &str {
        "Render labelled numeric series as a bar, line, area or pie chart"
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(ChartInput)).unwrap_or_else(|_| json!({ "type": "object" }))
    }

    async fn call(&self, input: Value, call: BuiltinCall) -> CapabilityResult<Value> {
        let input: ChartInput =
            serde_json::from_value(input).map_err(|e| CapabilityError::InvalidInput(e.to_string()))?;
        input.validate()?;

        let totals: Vec<Value> = input
            .series
            .iter()
            .map(|s| json!({ "name": s.name, "total": s.data.iter().sum::<f64>() }))
            .collect();

        Ok(json!({
            "callId": call.call_id,
            "chart": input,
            "summary": {
                "points": input.labels.len(),
                "series": totals,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancellationToken;

    fn call() -> BuiltinCall {
        BuiltinCall {
            call_id: "call-1".into(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_builds_chart_spec() {
        let output = ChartTool::new()
            .call(
                json!({
                    "chartType": "line",
                    "title": "Clicks",
                    "labels": ["Mon", "Tue"],
                    "series": [{ "name": "clicks", "data": [3.0, 4.5] }]
                }),
                call(),
            )
            .await
            .unwrap();

        assert_eq!(output["callId"], json!("call-1"));
        assert_eq!(output["chart"]["chartType"], json!("line"));
        assert_eq!(output["summary"]["points"], json!(2));
        assert_eq!(output["summary"]["series"][0]["total"], json!(7.5));
    }

    #[tokio::test]
    async fn test_rejects_mismatched_series() {
        let err = ChartTool::new()
            .call(
                json!({
                    "labels": ["a", "b", "c"],
                    "series": [{ "name": "s", "data": [1.0] }]
                }),
                call(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(ref m) if m.contains("1 points for 3 labels")));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = ChartTool::new().input_schema();
        assert!(schema["properties"]["labels"].is_object());
        assert!(schema["properties"]["series"].is_object());
    }
}

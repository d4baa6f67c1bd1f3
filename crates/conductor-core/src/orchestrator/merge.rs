//! Merging dependency results into a tool step's inputs
//!
//! Policy:
//! - dependency results merge in declared dependency order
//! - object results contribute their fields; the first dependency to
//!   provide a field keeps it and later ones are reported as collisions
//! - non-object results go under the dependency's step id
//! - the step's static inputs override anything merged

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// A field two dependencies both provided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCollision {
    pub key: String,
    pub kept_from: String,
    pub dropped_from: String,
}

/// Merge output
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedInputs {
    pub inputs: Map<String, Value>,
    pub collisions: Vec<InputCollision>,
}

/// Merge `dependencies` (step id, result) and `static_inputs`
pub fn merge_inputs(static_inputs: &Map<String, Value>, dependencies: &[(&str, &Value)]) -> MergedInputs {
    let mut merged = MergedInputs::default();
    let mut provided_by: HashMap<String, String> = HashMap::new();

    for (step_id, result) in dependencies {
        let fields: Vec<(String, Value)> = match result {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            other => vec![(step_id.to_string(), (*other).clone())],
        };

        for (key, value) in fields {
            if let Some(first) = provided_by.get(&key) {
                merged.collisions.push(InputCollision {
                    key,
                    kept_from: first.clone(),
                    dropped_from: step_id.to_string(),
                });
                continue;
            }
            provided_by.insert(key.clone(), step_id.to_string());
            merged.inputs.insert(key, value);
        }
    }

    for (key, value) in static_inputs {
        merged.inputs.insert(key.clone(), value.clone());
    }
    merged
}

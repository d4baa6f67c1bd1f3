//! Execution planning

use std::collections::HashMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capabilities::{Capability, CapabilityCatalog};
use crate::completion::{generate_typed, CompletionRequest, CompletionService};
use crate::logging::{Logger, NoOpLogger};
use crate::{log_info, log_warn};
use super::analyzer::QueryAnalysis;
use super::error::{OrchestratorError, OrchestratorResult};
use super::plan::{step_id, ExecutionPlan, ExecutionStep, StepKind};

/// Schema name of the plan object
pub const PLAN_SCHEMA: &str = "execution_plan";

/// Confidence used when the model leaves it out
const DEFAULT_CONFIDENCE: f64 = 0.7;
/// Confidence of keyword-built plans
const SIMPLE_PLAN_CONFIDENCE: f64 = 0.8;

const SUMMARY_DESCRIPTION: &str = "Summarize the results for the user";

/// Plan as the model returns it
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    steps: Vec<RawStep>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    /// Optional label other steps can depend on
    #[serde(default)]
    id: Option<String>,
    kind: StepKind,
    /// Capability id, required for tool steps
    #[serde(default)]
    capability_id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    inputs: Option<Map<String, Value>>,
    /// Earlier step ids or zero-based indexes
    #[serde(default)]
    depends_on: Option<Vec<Value>>,
}

/// Turns a query analysis into an execution plan
pub struct ExecutionPlanner {
    completion: Arc<dyn CompletionService>,
    logger: Arc<dyn Logger>,
}

impl ExecutionPlanner {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Capabilities whose category or name intersects `required`
    pub fn relevant_capabilities<'a>(required: &[String], catalog: &'a CapabilityCatalog) -> Vec<&'a Capability> {
        let required: Vec<String> = required.iter().map(|r| r.to_lowercase()).collect();
        catalog
            .all()
            .iter()
            .filter(|capability| {
                let category = capability.category.to_lowercase();
                let name = capability.name.to_lowercase();
                required.iter().any(|r| {
                    category.contains(r.as_str()) || r.contains(category.as_str()) || name.contains(r.as_str())
                })
            })
            .collect()
    }

    fn system_prompt(relevant: &[&Capability]) -> String {
        let mut prompt = String::from(
            "You plan how to answer a user request with the capabilities listed below.\n\
             Rules:\n\
             - Use only capability ids from the list, for tool steps only.\n\
             - Fetch all the data you need before any analysis step.\n\
             - End with exactly one summary step.\n\
             - Keep plans short, typically 2 to 5 steps.\n\
             - dependsOn lists ids (or zero-based indexes) of earlier steps whose results a step needs.\n\
             - Put tool arguments you can read from the request into inputs.\n\nCapabilities:\n",
        );
        if relevant.is_empty() {
            prompt.push_str("(none)\n");
        }
        for capability in relevant {
            prompt.push_str(&capability.prompt_line());
            if let Some(schema) = &capability.input_schema {
                prompt.push_str(&format!("\n  input schema: {}", schema));
            }
            prompt.push('\n');
        }
        prompt
    }

    /// Ask the model for a plan and normalize it
    pub async fn create_plan(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        catalog: &CapabilityCatalog,
    ) -> OrchestratorResult<ExecutionPlan> {
        let relevant = Self::relevant_capabilities(&analysis.required_capabilities, catalog);
        let prompt = format!(
            "Request: {}\nIntent: {}\nEntities: {}\nComplexity: {:?}",
            query,
            analysis.intent,
            serde_json::to_string(&analysis.entities).unwrap_or_default(),
            analysis.complexity
        );
        let request = CompletionRequest::prompt(prompt).with_system(Self::system_prompt(&relevant));

        let raw: RawPlan = generate_typed(self.completion.as_ref(), PLAN_SCHEMA, request)
            .await
            .map_err(OrchestratorError::Planning)?;

        let plan = self.normalize(query, raw, catalog);
        log_info!(
            self.logger,
            "[ExecutionPlanner] {} steps (confidence {:.2}) for '{}'",
            plan.steps.len(), plan.confidence, query
        );
        Ok(plan)
    }

    fn normalize(&self, query: &str, raw: RawPlan, catalog: &CapabilityCatalog) -> ExecutionPlan {
        let mut steps: Vec<ExecutionStep> = Vec::new();
        // Raw position and label -> what became of that step
        let mut positions: Vec<Slot> = Vec::with_capacity(raw.steps.len());
        let mut labels: HashMap<String, Slot> = HashMap::new();

        for raw_step in raw.steps {
            let label = raw_step.id.clone().filter(|l| !l.is_empty());
            let slot = self.place_step(raw_step, &positions, &labels, &mut steps, catalog);
            if let Some(label) = label {
                labels.entry(label).or_insert_with(|| slot.clone());
            }
            positions.push(slot);
        }

        let summary_id = step_id(steps.len() + 1);
        steps.push(ExecutionStep::new(summary_id, StepKind::Summary, SUMMARY_DESCRIPTION));

        ExecutionPlan::new(
            query,
            steps,
            raw.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            raw.rationale.unwrap_or_default(),
        )
    }

    /// Keep or drop one raw step, returning what later steps resolve it to
    fn place_step(
        &self,
        raw_step: RawStep,
        positions: &[Slot],
        labels: &HashMap<String, Slot>,
        steps: &mut Vec<ExecutionStep>,
        catalog: &CapabilityCatalog,
    ) -> Slot {
        match raw_step.kind {
            StepKind::Summary => return Slot::Ignored,
            StepKind::Tool => match raw_step.capability_id.as_deref() {
                Some(id) if catalog.get(id).is_some() => {}
                other => {
                    log_warn!(
                        self.logger,
                        "[ExecutionPlanner] Dropping tool step with unknown capability {:?}",
                        other
                    );
                    return Slot::Dropped;
                }
            },
            StepKind::Analysis => {}
        }

        let k = steps.len();
        let Some(depends_on) = resolve_dependencies(k, raw_step.depends_on.as_deref(), positions, labels, steps) else {
            log_warn!(
                self.logger,
                "[ExecutionPlanner] Dropping step '{}': it depends on a dropped step",
                raw_step.description
            );
            return Slot::Dropped;
        };

        let id = step_id(k + 1);
        let mut step = ExecutionStep::new(id.clone(), raw_step.kind, raw_step.description)
            .with_inputs(raw_step.inputs.unwrap_or_default())
            .with_depends_on(depends_on);
        step.capability_id = raw_step.capability_id.filter(|_| raw_step.kind == StepKind::Tool);
        steps.push(step);
        Slot::Kept(id)
    }

    /// Deterministic sequential plan: one tool step per resolvable entry
    ///
    /// Each entry is either a capability id or a category; a category picks
    /// the first capability in it. Unresolvable entries are skipped.
    pub fn create_simple_plan(query: &str, required: &[String], catalog: &CapabilityCatalog) -> ExecutionPlan {
        let mut chosen: Vec<&Capability> = Vec::new();
        for entry in required {
            let capability = catalog
                .get(entry)
                .or_else(|| catalog.by_category(entry).into_iter().next());
            if let Some(capability) = capability {
                if !chosen.iter().any(|c| c.id == capability.id) {
                    chosen.push(capability);
                }
            }
        }

        let mut steps: Vec<ExecutionStep> = Vec::new();
        for capability in chosen {
            let id = step_id(steps.len() + 1);
            let mut step = ExecutionStep::tool(id, capability.id.clone(), capability.description.clone());
            if let Some(previous) = steps.last() {
                step.depends_on = vec![previous.id.clone()];
            }
            steps.push(step);
        }
        steps.push(ExecutionStep::new(step_id(steps.len() + 1), StepKind::Summary, SUMMARY_DESCRIPTION));

        ExecutionPlan::new(query, steps, SIMPLE_PLAN_CONFIDENCE, "Sequential plan from matched capabilities")
    }
}

/// Outcome of one raw step during normalization
#[derive(Debug, Clone)]
enum Slot {
    /// Kept under the assigned id
    Kept(String),
    /// Removed, and so is everything that depends on it
    Dropped,
    /// Model-written summary step, replaced by the final one
    Ignored,
}

/// Resolve declared dependencies of the step at index `k`
///
/// A token may be an earlier step's label, an already assigned id, or the
/// zero-based position of an earlier step in the model's list. Missing or
/// entirely unresolvable lists fall back to the previous step; an explicit
/// empty list stays empty. Returns `None` when any token names a dropped step.
fn resolve_dependencies(
    k: usize,
    declared: Option<&[Value]>,
    positions: &[Slot],
    labels: &HashMap<String, Slot>,
    earlier: &[ExecutionStep],
) -> Option<Vec<String>> {
    let previous = || if k > 0 { vec![step_id(k)] } else { Vec::new() };

    let declared = match declared {
        None => return Some(previous()),
        Some([]) => return Some(Vec::new()),
        Some(declared) => declared,
    };

    let at = |i: u64| usize::try_from(i).ok().and_then(|i| positions.get(i)).cloned();

    let mut resolved: Vec<String> = Vec::new();
    for token in declared {
        let slot = match token {
            Value::String(s) => labels
                .get(s)
                .cloned()
                .or_else(|| earlier.iter().find(|step| &step.id == s).map(|step| Slot::Kept(step.id.clone())))
                .or_else(|| s.trim().parse::<u64>().ok().and_then(at)),
            Value::Number(n) => n.as_u64().and_then(at),
            _ => None,
        };
        match slot {
            Some(Slot::Kept(target)) if !resolved.contains(&target) => resolved.push(target),
            Some(Slot::Dropped) => return None,
            _ => {}
        }
    }

    if resolved.is_empty() {
        Some(previous())
    } else {
        Some(resolved)
    }
}

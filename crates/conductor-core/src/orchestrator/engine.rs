//! Orchestration engine: analyze, plan, execute, summarize

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::capabilities::{CallContext, CapabilityCatalog, CapabilityRegistry};
use crate::completion::{CompletionRequest, CompletionService};
use crate::logging::{Logger, NoOpLogger};
use crate::{log_debug, log_info, log_warn};
use super::analyzer::{QueryAnalysis, QueryAnalyzer};
use super::error::{ExecutionError, OrchestratorError, OrchestratorResult};
use super::merge::merge_inputs;
use super::plan::{ExecutionPlan, ExecutionStep, StepKind, StepStatus};
use super::planner::ExecutionPlanner;

/// Outcome of one orchestration run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub query: String,
    pub analysis: QueryAnalysis,
    /// The plan with final step statuses
    pub plan: ExecutionPlan,
    pub final_response: String,
    /// Capability ids of completed tool steps, in first-use order
    pub capabilities_used: Vec<String>,
    #[serde(rename = "executionTimeMs", serialize_with = "duration_ms")]
    pub execution_time: Duration,
}

fn duration_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl OrchestrationResult {
    /// Steps that failed, for diagnostics
    pub fn failed_steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.plan.steps.iter().filter(|s| s.status == StepStatus::Failed)
    }
}

/// Top-level entry point for answering a query with capabilities
///
/// A run goes `analyze -> plan -> execute -> summarize`. Any phase error
/// aborts the run; a failing step does not.
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    completion: Arc<dyn CompletionService>,
    analyzer: QueryAnalyzer,
    planner: ExecutionPlanner,
    logger: Arc<dyn Logger>,
}

impl Orchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(Arc::clone(&completion)),
            planner: ExecutionPlanner::new(Arc::clone(&completion)),
            registry,
            completion,
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Set the logger for the engine, analyzer and planner
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.analyzer = self.analyzer.with_logger(Arc::clone(&logger));
        self.planner = self.planner.with_logger(Arc::clone(&logger));
        self.logger = logger;
        self
    }

    /// Capability registry backing this orchestrator
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Answer `query` end to end
    pub async fn orchestrate(&self, query: &str, ctx: &CallContext) -> OrchestratorResult<OrchestrationResult> {
        let started = Instant::now();
        log_info!(self.logger, "[Orchestrator] Orchestrating '{}'", query);

        let catalog = until_cancelled(ctx, self.registry.get_available_capabilities(ctx)).await?;

        let mut analysis = until_cancelled(ctx, self.analyzer.analyze(query, &catalog)).await??;
        if analysis.required_capabilities.is_empty() {
            analysis.required_capabilities = self.analyzer.quick_match(query, &catalog.categories());
            log_debug!(
                self.logger,
                "[Orchestrator] Keyword match filled required capabilities: {:?}",
                analysis.required_capabilities
            );
        }

        let mut plan = until_cancelled(ctx, self.planner.create_plan(query, &analysis, &catalog)).await??;

        self.execute_plan(&mut plan, &catalog, &analysis, ctx).await?;

        let final_response = match plan
            .summary_step()
            .filter(|s| s.is_completed())
            .and_then(|s| s.result.as_ref())
            .and_then(Value::as_str)
        {
            Some(summary) => summary.to_string(),
            None => until_cancelled(ctx, self.synthesize(query, &plan, &analysis.language)).await??,
        };

        let mut capabilities_used: Vec<String> = Vec::new();
        for step in plan.tool_steps().filter(|s| s.is_completed()) {
            if let Some(id) = &step.capability_id {
                if !capabilities_used.contains(id) {
                    capabilities_used.push(id.clone());
                }
            }
        }

        let execution_time = started.elapsed();
        log_info!(
            self.logger,
            "[Orchestrator] Done in {:?}: {}/{} steps completed",
            execution_time,
            plan.steps.iter().filter(|s| s.is_completed()).count(),
            plan.steps.len()
        );

        Ok(OrchestrationResult {
            query: query.to_string(),
            analysis,
            plan,
            final_response,
            capabilities_used,
            execution_time,
        })
    }

    /// Run `plan` in order, respecting dependencies
    ///
    /// A step runs only when every dependency is an earlier completed step;
    /// otherwise it stays pending. Step failures are recorded on the step.
    /// On cancellation the running step fails, the remaining steps are
    /// skipped and `Cancelled` is returned.
    pub async fn execute_plan(
        &self,
        plan: &mut ExecutionPlan,
        catalog: &CapabilityCatalog,
        analysis: &QueryAnalysis,
        ctx: &CallContext,
    ) -> OrchestratorResult<()> {
        for index in 0..plan.steps.len() {
            if ctx.cancel.is_cancelled() {
                skip_from(plan, index);
                log_warn!(self.logger, "[Orchestrator] Cancelled before {}", plan.steps[index].id);
                return Err(OrchestratorError::Cancelled);
            }

            let (earlier, rest) = plan.steps.split_at_mut(index);
            let step = &mut rest[0];

            let ready = step
                .depends_on
                .iter()
                .all(|dep| earlier.iter().any(|s| &s.id == dep && s.is_completed()));
            if !ready {
                log_info!(
                    self.logger,
                    "[Orchestrator] Skipping {}: dependencies {:?} not completed",
                    step.id, step.depends_on
                );
                continue;
            }

            step.status = StepStatus::Running;
            log_debug!(self.logger, "[Orchestrator] Running {} ({:?})", step.id, step.kind);

            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                result = self.run_step(step, earlier, catalog, &plan.query, &analysis.language, ctx) => Some(result),
            };

            match outcome {
                Some(Ok(value)) => {
                    step.result = Some(value);
                    step.status = StepStatus::Completed;
                }
                Some(Err(e)) => {
                    log_warn!(self.logger, "[Orchestrator] {} failed: {}", step.id, e);
                    step.error = Some(e.to_string());
                    step.status = StepStatus::Failed;
                }
                None => {
                    step.error = Some(OrchestratorError::Cancelled.to_string());
                    step.status = StepStatus::Failed;
                    log_warn!(self.logger, "[Orchestrator] Cancelled during {}", step.id);
                    skip_from(plan, index + 1);
                    return Err(OrchestratorError::Cancelled);
                }
            }
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: &ExecutionStep,
        earlier: &[ExecutionStep],
        catalog: &CapabilityCatalog,
        query: &str,
        language: &str,
        ctx: &CallContext,
    ) -> Result<Value, ExecutionError> {
        match step.kind {
            StepKind::Tool => self.run_tool(step, earlier, catalog, ctx).await,
            StepKind::Analysis => {
                let data = completed_results(earlier);
                let prompt = format!(
                    "Task: {}\nUser request: {}\n\nData:\n{}",
                    step.description,
                    query,
                    pretty(&data)
                );
                let request = CompletionRequest::prompt(prompt)
                    .with_system("Analyze the data for the task. Be concise and factual.");
                let analysis = self.completion.generate_text(request).await?;
                Ok(json!({ "analysis": analysis, "data": data }))
            }
            StepKind::Summary => {
                let data = completed_results(earlier);
                let answer = self.completion.generate_text(answer_request(query, &data, language)).await?;
                Ok(Value::String(answer))
            }
        }
    }

    async fn run_tool(
        &self,
        step: &ExecutionStep,
        earlier: &[ExecutionStep],
        catalog: &CapabilityCatalog,
        ctx: &CallContext,
    ) -> Result<Value, ExecutionError> {
        let id = step.capability_id.as_deref().ok_or(ExecutionError::MissingCapability)?;
        let capability = catalog
            .get(id)
            .ok_or_else(|| ExecutionError::CapabilityNotFound(id.to_string()))?;
        let executor = capability
            .executor
            .as_ref()
            .ok_or_else(|| ExecutionError::NotExecutable(id.to_string()))?;

        let dependencies: Vec<(&str, &Value)> = step
            .depends_on
            .iter()
            .filter_map(|dep| earlier.iter().find(|s| &s.id == dep))
            .filter_map(|s| s.result.as_ref().map(|r| (s.id.as_str(), r)))
            .collect();
        let merged = merge_inputs(&step.inputs, &dependencies);
        for collision in &merged.collisions {
            log_warn!(
                self.logger,
                "[Orchestrator] {}: input '{}' from {} kept, value from {} dropped",
                step.id, collision.key, collision.kept_from, collision.dropped_from
            );
        }

        Ok(executor.execute(Value::Object(merged.inputs), ctx).await?)
    }

    async fn synthesize(&self, query: &str, plan: &ExecutionPlan, language: &str) -> OrchestratorResult<String> {
        let data = completed_results(&plan.steps);
        self.completion
            .generate_text(answer_request(query, &data, language))
            .await
            .map_err(OrchestratorError::Synthesis)
    }
}

async fn until_cancelled<F: Future>(ctx: &CallContext, future: F) -> OrchestratorResult<F::Output> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(OrchestratorError::Cancelled),
        output = future => Ok(output),
    }
}

fn skip_from(plan: &mut ExecutionPlan, index: usize) {
    for step in plan.steps.iter_mut().skip(index) {
        if step.status == StepStatus::Pending {
            step.status = StepStatus::Skipped;
        }
    }
}

/// Results of completed steps keyed by step id
fn completed_results(steps: &[ExecutionStep]) -> Value {
    let results: Map<String, Value> = steps
        .iter()
        .filter(|s| s.is_completed())
        .filter_map(|s| s.result.clone().map(|r| (s.id.clone(), r)))
        .collect();
    Value::Object(results)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn answer_request(query: &str, data: &Value, language: &str) -> CompletionRequest {
    let system = format!(
        "You answer the user's request using the results below. \
         Reply in the language with ISO 639-1 code '{}'. \
         If results are missing, say what could not be found.",
        language
    );
    CompletionRequest::prompt(format!("User request: {}\n\nResults:\n{}", query, pretty(data))).with_system(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::ChartTool;
    use crate::capabilities::{BuiltinTool, RemoteToolSource};
    use crate::completion::{MockCompletionService, MockMode};
    use crate::config::{MemoryConfigStorage, RuntimeSettings};
    use crate::logging::CaptureLogger;
    use crate::mcp::{ConnectionRegistry, Connector};
    use crate::orchestrator::analyzer::{Complexity, ANALYSIS_SCHEMA};
    use crate::orchestrator::plan::step_id;
    use crate::orchestrator::planner::PLAN_SCHEMA;
    use crate::testing::{FakeConnector, RecordingBuiltin};
    use crate::types::{CancellationToken, ServerConfig, ToolDescriptor};

    fn analysis() -> QueryAnalysis {
        QueryAnalysis {
            intent: "test".to_string(),
            entities: Vec::new(),
            required_capabilities: Vec::new(),
            complexity: Complexity::Simple,
            language: "en".to_string(),
        }
    }

    fn builtin_registry(tools: &[&Arc<RecordingBuiltin>]) -> Arc<CapabilityRegistry> {
        let registry = tools.iter().fold(CapabilityRegistry::new(), |registry, tool| {
            registry.with_builtin(Arc::clone(tool) as Arc<dyn BuiltinTool>)
        });
        Arc::new(registry)
    }

    fn tool_step(n: usize, capability: &str, deps: &[usize]) -> ExecutionStep {
        ExecutionStep::tool(step_id(n), capability, capability).with_depends_on(deps.iter().map(|d| step_id(*d)))
    }

    fn summary_step(n: usize) -> ExecutionStep {
        ExecutionStep::new(step_id(n), StepKind::Summary, "summarize")
    }

    #[tokio::test]
    async fn test_failed_dependency_leaves_dependents_pending() {
        let a = Arc::new(RecordingBuiltin::new("t", "a").with_failure("quota exceeded"));
        let b = Arc::new(RecordingBuiltin::new("t", "b"));
        let c = Arc::new(RecordingBuiltin::new("t", "c"));
        let registry = builtin_registry(&[&a, &b, &c]);
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(MockCompletionService::new()));
        let ctx = CallContext::new();
        let catalog = registry.get_available_capabilities(&ctx).await;

        let mut plan = ExecutionPlan::new(
            "q",
            vec![
                tool_step(1, "built-in:a", &[]),
                tool_step(2, "built-in:b", &[1]),
                tool_step(3, "built-in:c", &[2]),
                summary_step(4),
            ],
            0.9,
            "",
        );
        orchestrator.execute_plan(&mut plan, &catalog, &analysis(), &ctx).await.unwrap();

        let statuses: Vec<StepStatus> = plan.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Failed, StepStatus::Pending, StepStatus::Pending, StepStatus::Completed]
        );
        assert!(plan.steps[0].error.as_deref().unwrap_or_default().contains("quota exceeded"));
        assert!(b.calls().is_empty());
        assert!(c.calls().is_empty());
        assert_eq!(plan.executed_steps().count(), 2);
    }

    #[tokio::test]
    async fn test_dependency_results_merge_into_inputs() {
        let a = Arc::new(RecordingBuiltin::new("t", "a"));
        let b = Arc::new(RecordingBuiltin::new("t", "b"));
        let registry = builtin_registry(&[&a, &b]);
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(MockCompletionService::new()));
        let ctx = CallContext::new();
        let catalog = registry.get_available_capabilities(&ctx).await;

        let mut inputs = Map::new();
        inputs.insert("x".to_string(), json!(1));
        inputs.insert("y".to_string(), json!("from a"));
        let mut overrides = Map::new();
        overrides.insert("y".to_string(), json!("static"));

        let mut plan = ExecutionPlan::new(
            "q",
            vec![
                tool_step(1, "built-in:a", &[]).with_inputs(inputs),
                tool_step(2, "built-in:b", &[1]).with_inputs(overrides),
                summary_step(3),
            ],
            0.9,
            "",
        );
        orchestrator.execute_plan(&mut plan, &catalog, &analysis(), &ctx).await.unwrap();

        assert_eq!(b.calls()[0].1, json!({ "x": 1, "y": "static" }));
        assert!(plan.steps.iter().all(ExecutionStep::is_completed));
    }

    #[tokio::test]
    async fn test_input_collisions_are_logged() {
        let a = Arc::new(RecordingBuiltin::new("t", "a"));
        let b = Arc::new(RecordingBuiltin::new("t", "b"));
        let c = Arc::new(RecordingBuiltin::new("t", "c"));
        let registry = builtin_registry(&[&a, &b, &c]);
        let logger = Arc::new(CaptureLogger::new());
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(MockCompletionService::new()))
            .with_logger(Arc::clone(&logger) as Arc<dyn Logger>);
        let ctx = CallContext::new();
        let catalog = registry.get_available_capabilities(&ctx).await;

        let input = |value: i64| {
            let mut map = Map::new();
            map.insert("id".to_string(), json!(value));
            map
        };
        let mut plan = ExecutionPlan::new(
            "q",
            vec![
                tool_step(1, "built-in:a", &[]).with_inputs(input(1)),
                tool_step(2, "built-in:b", &[]).with_inputs(input(2)),
                tool_step(3, "built-in:c", &[1, 2]),
            ],
            0.9,
            "",
        );
        orchestrator.execute_plan(&mut plan, &catalog, &analysis(), &ctx).await.unwrap();

        assert_eq!(c.calls()[0].1, json!({ "id": 1 }));
        let warnings = logger.matching("input 'id'");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("WARN [Orchestrator] step_3"));
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_step_gracefully() {
        let registry = Arc::new(CapabilityRegistry::new().with_builtin(Arc::new(ChartTool::new())));
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(MockCompletionService::new()));
        let ctx = CallContext::new();
        let catalog = registry.get_available_capabilities(&ctx).await;

        let mut plan = ExecutionPlan::new(
            "q",
            vec![tool_step(1, "google_ads__get_campaigns", &[]), summary_step(2)],
            0.5,
            "",
        );
        orchestrator.execute_plan(&mut plan, &catalog, &analysis(), &ctx).await.unwrap();

        assert_eq!(plan.steps[0].status, StepStatus::Failed);
        assert!(plan.steps[0].error.as_deref().unwrap_or_default().contains("not found"));
        assert_eq!(plan.steps[1].status, StepStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_skips_remaining_steps() {
        let slow = Arc::new(RecordingBuiltin::new("t", "slow").with_delay(Duration::from_secs(10)));
        let fast = Arc::new(RecordingBuiltin::new("t", "fast"));
        let registry = builtin_registry(&[&slow, &fast]);
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(MockCompletionService::new()));
        let token = CancellationToken::new();
        let ctx = CallContext::new().with_cancel(token.clone());
        let catalog = registry.get_available_capabilities(&ctx).await;

        let mut plan = ExecutionPlan::new(
            "q",
            vec![tool_step(1, "built-in:slow", &[]), tool_step(2, "built-in:fast", &[]), summary_step(3)],
            0.9,
            "",
        );
        let analysis = analysis();
        let (result, _) = tokio::join!(
            orchestrator.execute_plan(&mut plan, &catalog, &analysis, &ctx),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            }
        );

        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
        let statuses: Vec<StepStatus> = plan.steps.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped]);
        assert_eq!(slow.calls().len(), 1);
        assert!(fast.calls().is_empty());
    }

    #[tokio::test]
    async fn test_orchestrate_pre_cancelled() {
        let registry = Arc::new(CapabilityRegistry::new());
        let orchestrator = Orchestrator::new(registry, Arc::new(MockCompletionService::new()));
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator
            .orchestrate("anything", &CallContext::new().with_cancel(token))
            .await;
        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_ping_end_to_end() {
        let storage = Arc::new(MemoryConfigStorage::with_servers([(
            "serverA".to_string(),
            ServerConfig::local("echo-tool"),
        )]));
        let connector = Arc::new(
            FakeConnector::new().with_server("serverA", vec![ToolDescriptor::new("ping", "Return x")]),
        );
        let connections = ConnectionRegistry::new(
            storage,
            Arc::clone(&connector) as Arc<dyn Connector>,
            RuntimeSettings::default().with_idle_timeout(None),
            Arc::new(NoOpLogger),
        );
        let capabilities = Arc::new(
            CapabilityRegistry::new().with_remote_tools(Arc::clone(&connections) as Arc<dyn RemoteToolSource>),
        );

        let completion = Arc::new(
            MockCompletionService::new()
                .with_object(
                    ANALYSIS_SCHEMA,
                    json!({ "intent": "ping", "requiredCapabilities": ["servera"], "complexity": "simple" }),
                )
                .with_object(
                    PLAN_SCHEMA,
                    json!({
                        "steps": [
                            { "kind": "tool", "capabilityId": "serverA__ping", "description": "ping", "inputs": { "x": 42 } },
                            { "kind": "summary", "description": "summarize" }
                        ]
                    }),
                ),
        );
        let orchestrator = Orchestrator::new(capabilities, completion);

        let result = orchestrator
            .orchestrate("ping 42 and summarize", &CallContext::new())
            .await
            .unwrap();

        let kinds: Vec<StepKind> = result.plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StepKind::Tool, StepKind::Summary]);
        assert_eq!(connector.calls("serverA"), vec![("ping".to_string(), json!({ "x": 42 }))]);
        assert!(result.final_response.contains("42"));
        assert_eq!(result.capabilities_used, vec!["serverA__ping".to_string()]);

        let wire = serde_json::to_value(&result).unwrap();
        assert!(wire["executionTimeMs"].is_u64());
        assert_eq!(wire["plan"]["steps"][0]["status"], json!("completed"));
    }

    #[tokio::test]
    async fn test_unavailable_category_runs_without_tool_steps() {
        let capabilities = Arc::new(CapabilityRegistry::new().with_builtin(Arc::new(ChartTool::new())));
        let completion = Arc::new(
            MockCompletionService::new()
                .with_object(
                    ANALYSIS_SCHEMA,
                    json!({ "intent": "ads report", "requiredCapabilities": ["google-ads"] }),
                )
                .with_object(
                    PLAN_SCHEMA,
                    json!({
                        "steps": [
                            { "kind": "tool", "capabilityId": "google_ads__get_campaigns", "description": "fetch" },
                            { "kind": "summary", "description": "summarize" }
                        ]
                    }),
                ),
        );
        let orchestrator = Orchestrator::new(capabilities, completion);

        let result = orchestrator
            .orchestrate("how are my google ads doing", &CallContext::new())
            .await
            .unwrap();

        assert_eq!(result.plan.tool_steps().count(), 0);
        assert!(result.capabilities_used.is_empty());
        assert!(result.failed_steps().next().is_none());
        assert!(!result.final_response.is_empty());
    }

    #[tokio::test]
    async fn test_missing_summary_is_synthesized() {
        let a = Arc::new(RecordingBuiltin::new("t", "a"));
        let registry = builtin_registry(&[&a]);
        let completion = Arc::new(MockCompletionService::with_mode(MockMode::Fixed("synthesized".into())));
        let orchestrator = Orchestrator::new(Arc::clone(&registry), completion);
        let ctx = CallContext::new();
        let catalog = registry.get_available_capabilities(&ctx).await;

        let mut plan = ExecutionPlan::new("q", vec![tool_step(1, "built-in:a", &[])], 0.9, "");
        orchestrator.execute_plan(&mut plan, &catalog, &analysis(), &ctx).await.unwrap();
        let answer = orchestrator.synthesize("q", &plan, "en").await.unwrap();
        assert_eq!(answer, "synthesized");
    }

    #[tokio::test]
    async fn test_analysis_failure_aborts_run() {
        let orchestrator = Orchestrator::new(
            Arc::new(CapabilityRegistry::new()),
            Arc::new(MockCompletionService::new()),
        );
        let result = orchestrator.orchestrate("q", &CallContext::new()).await;
        assert!(matches!(result, Err(OrchestratorError::Analysis(_))));
    }
}

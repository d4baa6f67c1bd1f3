//! Query orchestration
//!
//! `Orchestrator::orchestrate` classifies a query against the capability
//! catalog, asks the model for a plan, runs the plan step by step and
//! returns the answer together with the executed plan.
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::new(capabilities, completion).with_logger(logger);
//! let result = orchestrator.orchestrate("chart last week's sessions", &CallContext::new()).await?;
//! println!("{}", result.final_response);
//! ```

mod analyzer;
mod engine;
mod error;
mod merge;
mod plan;
mod planner;

pub use analyzer::{Complexity, Entity, QueryAnalysis, QueryAnalyzer, ANALYSIS_SCHEMA};
pub use engine::{OrchestrationResult, Orchestrator};
pub use error::{ExecutionError, OrchestratorError, OrchestratorResult};
pub use merge::{merge_inputs, InputCollision, MergedInputs};
pub use plan::{step_id, ExecutionPlan, ExecutionStep, StepKind, StepStatus};
pub use planner::{ExecutionPlanner, PLAN_SCHEMA};

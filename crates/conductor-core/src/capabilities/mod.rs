//! Capability catalog
//!
//! A capability is anything the planner can put in a plan: a tool on a
//! remote server, a saved workflow, or a built-in tool. Each one carries an
//! executor chosen when the catalog is built, so executing never branches
//! on kind.

mod categorizer;
mod error;
mod executors;
mod registry;
mod sources;
mod types;

pub use categorizer::{Categorizer, KeywordCategorizer, KeywordRule, WORKFLOW_CATEGORY};
pub use error::{CapabilityError, CapabilityResult};
pub use executors::{BuiltinExecutor, RemoteToolExecutor, WorkflowExecutor};
pub use registry::{builtin_capability_id, workflow_capability_id, CapabilityRegistry};
pub use sources::{BuiltinCall, BuiltinTool, RemoteToolSource, WorkflowSource, WorkflowSummary};
pub use types::{
    CallContext, Capability, CapabilityCatalog, CapabilityExecutor, CapabilityKind, CapabilitySource,
};

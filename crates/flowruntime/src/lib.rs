//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows node by node in
//! dependency order, the handler registry it dispatches through, and the
//! debug controller that can pause a run before chosen nodes.

mod debug;
mod executor;
mod registry;
mod runtime;

pub use debug::{DebugController, DebugHandle};
pub use executor::{ExecuteOptions, GateDecision, NodeGate, WorkflowExecutor};
pub use registry::HandlerRegistry;
pub use runtime::{FlowRuntime, RuntimeConfig};

//! Core abstractions for the flow engine
//!
//! This crate provides the workflow data model, graph ordering, the
//! placeholder expression language and the handler contract that all other
//! components depend on. It performs no I/O.

pub mod context;
mod error;
pub mod events;
mod execution;
pub mod expression;
pub mod graph;
mod handler;
mod value;
mod workflow;

pub use context::Context;
pub use error::{ExpressionError, FlowError, HandlerError, WorkflowError};
pub use events::*;
pub use execution::{ExecutionId, ExecutionResult, ExecutionStatus, WorkflowExecution};
pub use expression::ExpressionEngine;
pub use handler::{ConfigExt, Handler, HandlerMetadata};
pub use value::{number_from_f64, Value, ValueExt, ValueMap};
pub use workflow::{NodeId, Workflow, WorkflowConnection, WorkflowId, WorkflowNode};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

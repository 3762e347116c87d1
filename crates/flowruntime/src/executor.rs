use crate::registry::HandlerRegistry;
use async_trait::async_trait;
use chrono::Utc;
use flowcore::context::{EXECUTION, TRIGGER, WORKFLOW};
use flowcore::{
    graph, Context, EventBus, ExecutionEvent, ExecutionResult, ExecutionStatus, ExpressionEngine,
    FlowError, HandlerError, NodeId, Value, Workflow, WorkflowError, WorkflowExecution,
    WorkflowNode,
};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Per-call inputs for a workflow run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub trigger_data: Value,
    pub trigger_type: String,
    /// Skip every node ordered before this one.
    pub resume_from: Option<NodeId>,
    /// Context captured from an earlier run, used as the starting state.
    pub previous_context: Option<Context>,
}

impl ExecuteOptions {
    pub fn new(trigger_data: Value) -> Self {
        Self {
            trigger_data,
            trigger_type: "manual".to_string(),
            resume_from: None,
            previous_context: None,
        }
    }

    pub fn with_trigger_type(mut self, trigger_type: impl Into<String>) -> Self {
        self.trigger_type = trigger_type.into();
        self
    }

    /// Start from a saved context without skipping any node.
    pub fn with_previous_context(mut self, previous_context: Option<Context>) -> Self {
        self.previous_context = previous_context;
        self
    }

    pub fn resume_from(mut self, node_id: impl Into<NodeId>, previous_context: Option<Context>) -> Self {
        self.resume_from = Some(node_id.into());
        self.previous_context = previous_context;
        self
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::new(Value::Object(Default::default()))
    }
}

/// What a [`NodeGate`] wants the run to do with the node it was asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Cancel,
}

/// Hook awaited before each enabled node's handler is invoked.
#[async_trait]
pub trait NodeGate: Send + Sync {
    async fn before_node(&self, execution_id: &str, node: &WorkflowNode) -> GateDecision;
}

/// Runs workflows one node at a time in dependency order
///
/// Holds no per-run state, so a single executor can serve concurrent runs.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<HandlerRegistry>,
    engine: Arc<ExpressionEngine>,
    events: Arc<EventBus>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            engine: Arc::new(ExpressionEngine::new()),
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_engine(mut self, engine: Arc<ExpressionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<ExpressionEngine> {
        &self.engine
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Execute a workflow from its first node. Never fails: problems are
    /// reported through the returned record's status and error.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        trigger_data: Value,
        trigger_type: &str,
    ) -> WorkflowExecution {
        let options = ExecuteOptions::new(trigger_data).with_trigger_type(trigger_type);
        self.execute_with(workflow, options).await
    }

    pub async fn execute_with(&self, workflow: &Workflow, options: ExecuteOptions) -> WorkflowExecution {
        self.execute_gated(workflow, options, None).await.0
    }

    /// Like [`execute_with`](Self::execute_with), also returning the final
    /// context so a caller can persist it and resume later.
    pub async fn execute_with_context(
        &self,
        workflow: &Workflow,
        options: ExecuteOptions,
    ) -> (WorkflowExecution, Context) {
        self.execute_gated(workflow, options, None).await
    }

    /// Execute with a gate consulted before every enabled node.
    pub async fn execute_gated(
        &self,
        workflow: &Workflow,
        options: ExecuteOptions,
        gate: Option<&dyn NodeGate>,
    ) -> (WorkflowExecution, Context) {
        let ExecuteOptions {
            trigger_data,
            trigger_type,
            resume_from,
            previous_context,
        } = options;

        let mut execution = WorkflowExecution::start(&workflow.id, trigger_type, trigger_data.clone());
        self.events.emit(ExecutionEvent::WorkflowStarted {
            execution_id: execution.id.clone(),
            workflow_id: workflow.id.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution_id = %execution.id,
            "Starting workflow execution: {} ({})",
            workflow.name,
            workflow.id
        );

        let mut context = seed_context(workflow, &execution, trigger_data, previous_context);

        let outcome = AssertUnwindSafe(self.run_nodes(
            workflow,
            &mut execution,
            &mut context,
            resume_from.as_deref(),
            gate,
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(())) => {
                if execution.status == ExecutionStatus::Running {
                    execution.status = ExecutionStatus::Completed;
                }
            }
            Ok(Err(e)) => {
                tracing::error!(execution_id = %execution.id, "Workflow execution aborted: {}", e);
                execution.fail(e.to_string());
            }
            Err(panic) => {
                let e = FlowError::Engine(format!("executor panicked: {}", panic_message(panic.as_ref())));
                tracing::error!(execution_id = %execution.id, "{}", e);
                execution.fail(e.to_string());
            }
        }

        execution.finish();
        let duration_ms = execution.duration_ms.unwrap_or_default();
        self.events.emit(ExecutionEvent::WorkflowCompleted {
            execution_id: execution.id.clone(),
            status: execution.status,
            error: execution.error.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution_id = %execution.id,
            "Workflow execution {} in {}ms ({} node results)",
            execution.status,
            duration_ms,
            execution.node_results.len()
        );

        (execution, context)
    }

    async fn run_nodes(
        &self,
        workflow: &Workflow,
        execution: &mut WorkflowExecution,
        context: &mut Context,
        resume_from: Option<&str>,
        gate: Option<&dyn NodeGate>,
    ) -> Result<(), FlowError> {
        let order = graph::order(workflow)?;
        let nodes: HashMap<&str, &WorkflowNode> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut skipping = resume_from.is_some();

        for node_id in &order {
            if skipping {
                if Some(node_id.as_str()) != resume_from {
                    continue;
                }
                skipping = false;
                tracing::info!(execution_id = %execution.id, "Resuming from node {}", node_id);
            }

            let node = *nodes
                .get(node_id.as_str())
                .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;

            if !node.enabled {
                tracing::debug!(execution_id = %execution.id, "Skipping disabled node {}", node.id);
                self.events.emit(ExecutionEvent::NodeSkipped {
                    execution_id: execution.id.clone(),
                    node_id: node.id.clone(),
                    reason: "disabled".to_string(),
                    timestamp: Utc::now(),
                });
                continue;
            }

            if let Some(gate) = gate {
                if gate.before_node(&execution.id, node).await == GateDecision::Cancel {
                    tracing::info!(execution_id = %execution.id, "Execution cancelled before node {}", node.id);
                    execution.status = ExecutionStatus::Cancelled;
                    execution.error = Some("Execution cancelled".to_string());
                    return Ok(());
                }
            }

            let result = self.run_node(node, context, &execution.id).await;
            let succeeded = result.success;
            let message = result.error.clone().unwrap_or_default();
            execution.node_results.push(result);

            if succeeded {
                continue;
            }

            match node.on_error() {
                "continue" => {
                    tracing::warn!(
                        execution_id = %execution.id,
                        "Node {} failed, continuing: {}",
                        node.id,
                        message
                    );
                    context.record_output(&node.id, Value::Null);
                }
                policy => {
                    if policy != "stop" {
                        tracing::warn!(
                            "Node {} has unsupported on_error policy '{}', stopping",
                            node.id,
                            policy
                        );
                    }
                    tracing::error!(execution_id = %execution.id, "Node {} failed: {}", node.id, message);
                    execution.fail(message);
                    return Ok(());
                }
            }
        }

        if skipping {
            tracing::warn!(
                execution_id = %execution.id,
                "Resume node {} is not part of workflow {}, nothing was executed",
                resume_from.unwrap_or_default(),
                workflow.id
            );
        }

        Ok(())
    }

    /// Resolve, dispatch and time a single node. Failures of any kind become
    /// a failed result; the caller applies the node's error policy.
    async fn run_node(&self, node: &WorkflowNode, context: &mut Context, execution_id: &str) -> ExecutionResult {
        let started_at = Utc::now();
        let start = Instant::now();

        self.events.emit(ExecutionEvent::NodeStarted {
            execution_id: execution_id.to_string(),
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            timestamp: started_at,
        });
        tracing::debug!(execution_id, "Executing node {} ({})", node.id, node.node_type);

        let outcome = self.invoke(node, context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                context.record_output(&node.id, output.clone());
                self.events.emit(ExecutionEvent::NodeCompleted {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    output: output.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                ExecutionResult::success(&node.id, output, started_at, duration_ms)
            }
            Err(e) => {
                let message = e.to_string();
                self.events.emit(ExecutionEvent::NodeFailed {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    error: message.clone(),
                    timestamp: Utc::now(),
                });
                ExecutionResult::failure(&node.id, message, started_at, duration_ms)
            }
        }
    }

    async fn invoke(&self, node: &WorkflowNode, context: &mut Context) -> Result<Value, FlowError> {
        let handler = self
            .registry
            .get_handler(&node.node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node.node_type.clone()))?;

        let config = self.engine.resolve_map(&node.config, context.as_map())?;

        let output = AssertUnwindSafe(handler.execute(config, context))
            .catch_unwind()
            .await
            .map_err(|panic| HandlerError::Panicked(panic_message(panic.as_ref())))??;

        Ok(output)
    }
}

/// Build the starting context for a run.
fn seed_context(
    workflow: &Workflow,
    execution: &WorkflowExecution,
    trigger_data: Value,
    previous: Option<Context>,
) -> Context {
    let mut context = match previous {
        Some(mut previous) => {
            previous.set(TRIGGER, trigger_data);
            previous
        }
        None => Context::for_run(trigger_data, workflow.variables.clone()),
    };

    context.set(
        WORKFLOW,
        json!({
            "id": workflow.id,
            "name": workflow.name,
            "description": workflow.description,
            "version": workflow.version,
            "tags": workflow.tags,
            "settings": workflow.settings,
        }),
    );
    context.set(
        EXECUTION,
        json!({
            "id": execution.id,
            "workflow_id": execution.workflow_id,
            "trigger_type": execution.trigger_type,
            "started_at": execution.started_at,
        }),
    );
    for node in &workflow.nodes {
        context.register_node_name(&node.name, &node.id);
    }

    context
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

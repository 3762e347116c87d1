//! Breakpoint and single-step control over a running workflow.
//!
//! The executing task and the controlling side share a gate: a `watch`
//! channel holding `true` while execution may proceed. Pausing closes the
//! gate before a node's handler runs; `resume` and `step` reopen it.

use crate::executor::{ExecuteOptions, GateDecision, NodeGate, WorkflowExecutor};
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{Context, EventBus, ExecutionEvent, NodeId, Workflow, WorkflowExecution, WorkflowNode};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Breakpoints {
    nodes: HashSet<NodeId>,
    step_mode: bool,
}

struct DebugState {
    breakpoints: Mutex<Breakpoints>,
    gate: watch::Sender<bool>,
    paused_at: watch::Sender<Option<NodeId>>,
    cancel: CancellationToken,
    events: Arc<EventBus>,
}

/// Cloneable control surface for a debug session.
#[derive(Clone)]
pub struct DebugHandle {
    state: Arc<DebugState>,
}

impl DebugHandle {
    fn new(events: Arc<EventBus>) -> Self {
        let (gate, _) = watch::channel(true);
        let (paused_at, _) = watch::channel(None);
        Self {
            state: Arc::new(DebugState {
                breakpoints: Mutex::new(Breakpoints::default()),
                gate,
                paused_at,
                cancel: CancellationToken::new(),
                events,
            }),
        }
    }

    fn breakpoints(&self) -> MutexGuard<'_, Breakpoints> {
        // Breakpoints hold no invariants a panicking writer could break.
        self.state
            .breakpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_breakpoint(&self, node_id: impl Into<NodeId>) {
        let node_id = node_id.into();
        tracing::debug!("Breakpoint set on node {}", node_id);
        self.breakpoints().nodes.insert(node_id);
    }

    pub fn remove_breakpoint(&self, node_id: &str) -> bool {
        self.breakpoints().nodes.remove(node_id)
    }

    pub fn clear_breakpoints(&self) {
        self.breakpoints().nodes.clear();
    }

    pub fn breakpoints_list(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.breakpoints().nodes.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn set_step_mode(&self, enabled: bool) {
        self.breakpoints().step_mode = enabled;
    }

    pub fn step_mode(&self) -> bool {
        self.breakpoints().step_mode
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused_at.borrow().is_some()
    }

    /// Node the run is currently held in front of, if any.
    pub fn paused_at(&self) -> Option<NodeId> {
        self.state.paused_at.borrow().clone()
    }

    /// Leave step mode and let the run continue until the next breakpoint.
    pub fn resume(&self) {
        self.set_step_mode(false);
        self.open_gate();
    }

    /// Let exactly one node run, then pause again before the next one.
    pub fn step(&self) {
        self.set_step_mode(true);
        self.open_gate();
    }

    /// Abort the run at the next gate check. Permanent for this session.
    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    /// Wait until the run is paused and return the node it paused before.
    /// Returns immediately when already paused.
    pub async fn wait_for_pause(&self) -> NodeId {
        let mut rx = self.state.paused_at.subscribe();
        loop {
            if let Some(node_id) = rx.borrow_and_update().clone() {
                return node_id;
            }
            // The sender lives in `self.state`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn open_gate(&self) {
        self.state.paused_at.send_replace(None);
        self.state.gate.send_replace(true);
    }

    fn should_pause(&self, node_id: &str) -> bool {
        let breakpoints = self.breakpoints();
        breakpoints.step_mode || breakpoints.nodes.contains(node_id)
    }
}

#[async_trait]
impl NodeGate for DebugHandle {
    async fn before_node(&self, execution_id: &str, node: &WorkflowNode) -> GateDecision {
        if self.state.cancel.is_cancelled() {
            return GateDecision::Cancel;
        }
        if !self.should_pause(&node.id) {
            return GateDecision::Proceed;
        }

        self.state.gate.send_replace(false);
        let mut gate = self.state.gate.subscribe();
        self.state.paused_at.send_replace(Some(node.id.clone()));

        tracing::info!(execution_id, "Paused before node {}", node.id);
        self.state.events.emit(ExecutionEvent::DebugPaused {
            execution_id: execution_id.to_string(),
            node_id: node.id.clone(),
            timestamp: Utc::now(),
        });

        let decision = tokio::select! {
            opened = gate.wait_for(|open| *open) => match opened {
                Ok(_) => GateDecision::Proceed,
                Err(_) => GateDecision::Cancel,
            },
            _ = self.state.cancel.cancelled() => GateDecision::Cancel,
        };

        self.state.paused_at.send_if_modified(|paused| {
            if paused.as_deref() == Some(node.id.as_str()) {
                *paused = None;
                true
            } else {
                false
            }
        });

        if decision == GateDecision::Proceed {
            tracing::info!(execution_id, "Resumed at node {}", node.id);
            self.state.events.emit(ExecutionEvent::DebugResumed {
                execution_id: execution_id.to_string(),
                node_id: node.id.clone(),
                timestamp: Utc::now(),
            });
        }

        decision
    }
}

/// Executor wrapper that can pause a run before chosen nodes.
pub struct DebugController {
    executor: Arc<WorkflowExecutor>,
    handle: DebugHandle,
}

impl DebugController {
    pub fn new(executor: Arc<WorkflowExecutor>) -> Self {
        let handle = DebugHandle::new(executor.event_bus().clone());
        Self { executor, handle }
    }

    pub fn with_breakpoints<I, S>(self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        for node in nodes {
            self.handle.add_breakpoint(node);
        }
        self
    }

    pub fn handle(&self) -> DebugHandle {
        self.handle.clone()
    }

    pub async fn execute(&self, workflow: &Workflow, options: ExecuteOptions) -> WorkflowExecution {
        self.execute_with_context(workflow, options).await.0
    }

    pub async fn execute_with_context(
        &self,
        workflow: &Workflow,
        options: ExecuteOptions,
    ) -> (WorkflowExecution, Context) {
        self.executor
            .execute_gated(workflow, options, Some(&self.handle))
            .await
    }

    pub fn add_breakpoint(&self, node_id: impl Into<NodeId>) {
        self.handle.add_breakpoint(node_id);
    }

    pub fn remove_breakpoint(&self, node_id: &str) -> bool {
        self.handle.remove_breakpoint(node_id)
    }

    pub fn set_step_mode(&self, enabled: bool) {
        self.handle.set_step_mode(enabled);
    }

    pub fn resume(&self) {
        self.handle.resume();
    }

    pub fn step(&self) {
        self.handle.step();
    }

    pub fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }
}

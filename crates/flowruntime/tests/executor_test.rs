// crates/flowruntime/tests/executor_test.rs

use async_trait::async_trait;
use flowcore::{
    Context, ExecutionEvent, ExecutionStatus, Handler, HandlerError, Value, ValueMap, Workflow,
    WorkflowNode,
};
use flowruntime::{DebugController, ExecuteOptions, HandlerRegistry, WorkflowExecutor};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

type Journal = Arc<Mutex<Vec<String>>>;

struct Trigger;

#[async_trait]
impl Handler for Trigger {
    fn handler_type(&self) -> &str {
        "test.trigger"
    }

    async fn execute(&self, _config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        Ok(context.trigger().clone())
    }
}

struct SetVar;

#[async_trait]
impl Handler for SetVar {
    fn handler_type(&self) -> &str {
        "test.set_var"
    }

    async fn execute(&self, config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        for (key, value) in &config {
            context.set_var(key.clone(), value.clone());
        }
        Ok(Value::Object(config))
    }
}

/// Records the node it ran as and returns its resolved `message`.
struct Log {
    journal: Journal,
}

#[async_trait]
impl Handler for Log {
    fn handler_type(&self) -> &str {
        "test.log"
    }

    async fn execute(&self, config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        let message = config.get("message").cloned().unwrap_or(Value::Null);
        self.journal
            .lock()
            .unwrap()
            .push(config.get("tag").and_then(Value::as_str).unwrap_or("log").to_string());
        Ok(json!({"message": message, "prev": context.prev().clone()}))
    }
}

/// Fails until `healed` is set.
struct Flaky {
    healed: Arc<AtomicBool>,
}

#[async_trait]
impl Handler for Flaky {
    fn handler_type(&self) -> &str {
        "test.flaky"
    }

    async fn execute(&self, _config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
        if self.healed.load(Ordering::SeqCst) {
            Ok(json!("recovered"))
        } else {
            Err(HandlerError::ExecutionFailed("upstream unavailable".into()))
        }
    }
}

struct Harness {
    executor: Arc<WorkflowExecutor>,
    journal: Journal,
    healed: Arc<AtomicBool>,
}

fn harness() -> Harness {
    let journal: Journal = Arc::default();
    let healed = Arc::new(AtomicBool::new(false));

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(Trigger));
    registry.register(Arc::new(SetVar));
    registry.register(Arc::new(Log {
        journal: journal.clone(),
    }));
    registry.register(Arc::new(Flaky {
        healed: healed.clone(),
    }));

    Harness {
        executor: Arc::new(WorkflowExecutor::new(Arc::new(registry))),
        journal,
        healed,
    }
}

fn log_node(id: &str) -> WorkflowNode {
    WorkflowNode::with_id(id, "test.log").with_config("tag", id)
}

fn chain(nodes: Vec<WorkflowNode>) -> Workflow {
    let mut workflow = Workflow::new("chain");
    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    for node in nodes {
        workflow.add_node(node);
    }
    for pair in ids.windows(2) {
        workflow.connect(pair[0].clone(), pair[1].clone());
    }
    workflow
}

fn linear_workflow() -> Workflow {
    chain(vec![
        WorkflowNode::with_id("node1", "test.trigger"),
        WorkflowNode::with_id("node2", "test.set_var").with_config("counter", 42),
        WorkflowNode::with_id("node3", "test.log")
            .with_config("tag", "node3")
            .with_config("message", "{{ $vars.counter }}"),
    ])
}

fn failing_workflow(on_error: &str) -> Workflow {
    chain(vec![
        WorkflowNode::with_id("node1", "test.trigger"),
        WorkflowNode::with_id("node2", "test.flaky").with_config("on_error", on_error),
        log_node("node3"),
    ])
}

#[tokio::test]
async fn test_linear_workflow_completes() {
    let h = harness();
    let execution = h
        .executor
        .execute(&linear_workflow(), json!({"user": "ann"}), "manual")
        .await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 3);
    assert!(execution.node_results.iter().all(|r| r.success));
    assert_eq!(execution.node_results[0].data, json!({"user": "ann"}));
    assert_eq!(execution.node_results[2].data["message"], json!(42));
    assert!(execution.completed_at.is_some());
    assert!(execution.duration_ms.is_some());
    assert!(execution.error.is_none());
}

#[tokio::test]
async fn test_stop_policy_halts_run() {
    let h = harness();
    let execution = h.executor.execute(&failing_workflow("stop"), json!({}), "manual").await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.node_results.len(), 2);
    assert!(execution.result_for("node3").is_none());
    assert!(execution.error.as_deref().unwrap().contains("upstream unavailable"));
    assert!(h.journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_continue_policy_nulls_prev() {
    let h = harness();
    let execution = h
        .executor
        .execute(&failing_workflow("continue"), json!({}), "manual")
        .await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 3);
    assert!(!execution.node_results[1].success);
    assert_eq!(execution.node_results[2].data["prev"], Value::Null);
}

fn bad_expression_workflow(on_error: &str) -> Workflow {
    chain(vec![
        log_node("node1")
            .with_config("message", "{{ nope() }}")
            .with_config("on_error", on_error),
        log_node("node2"),
    ])
}

#[tokio::test]
async fn test_expression_error_fails_node_under_stop() {
    let h = harness();
    let execution = h
        .executor
        .execute(&bad_expression_workflow("stop"), json!({}), "manual")
        .await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.node_results.len(), 1);
    let result = &execution.node_results[0];
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("nope"));
    assert!(execution.error.as_deref().unwrap().contains("nope"));
    assert!(h.journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expression_error_under_continue_nulls_prev() {
    let h = harness();
    let execution = h
        .executor
        .execute(&bad_expression_workflow("continue"), json!({}), "manual")
        .await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 2);
    assert!(!execution.node_results[0].success);
    assert_eq!(execution.node_results[1].data["prev"], Value::Null);
    assert_eq!(*h.journal.lock().unwrap(), vec!["node2"]);
}

#[tokio::test]
async fn test_disabled_node_is_skipped() {
    let h = harness();
    let workflow = chain(vec![log_node("node1"), log_node("node2").disabled(), log_node("node3")]);
    let mut events = h.executor.event_bus().subscribe();

    let execution = h.executor.execute(&workflow, json!({}), "manual").await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.result_for("node2").is_none());
    assert_eq!(*h.journal.lock().unwrap(), vec!["node1", "node3"]);

    let mut skipped = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeSkipped { node_id, .. } = event {
            skipped.push(node_id);
        }
    }
    assert_eq!(skipped, vec!["node2"]);
}

#[tokio::test]
async fn test_results_follow_dependency_order() {
    let h = harness();
    let mut workflow = Workflow::new("diamond");
    for id in ["d", "b", "c", "a"] {
        workflow.add_node(log_node(id));
    }
    workflow.connect("a", "b");
    workflow.connect("a", "c");
    workflow.connect("b", "d");
    workflow.connect("c", "d");

    let execution = h.executor.execute(&workflow, json!({}), "manual").await;
    let order: Vec<&str> = execution.node_results.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_resume_from_failed_node() {
    let h = harness();
    let workflow = failing_workflow("stop");

    let (first, context) = h
        .executor
        .execute_with_context(&workflow, ExecuteOptions::new(json!({"run": 1})))
        .await;
    assert_eq!(first.status, ExecutionStatus::Failed);

    h.healed.store(true, Ordering::SeqCst);
    let resumed = h
        .executor
        .execute_with(
            &workflow,
            ExecuteOptions::new(json!({"run": 2})).resume_from("node2", Some(context)),
        )
        .await;

    assert_eq!(resumed.status, ExecutionStatus::Completed);
    let ids: Vec<&str> = resumed.node_results.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(ids, vec!["node2", "node3"]);
    assert_eq!(resumed.node_results[1].data["prev"], json!("recovered"));
}

#[tokio::test]
async fn test_resume_from_unknown_node_runs_nothing() {
    let h = harness();
    let execution = h
        .executor
        .execute_with(
            &linear_workflow(),
            ExecuteOptions::default().resume_from("nowhere", None),
        )
        .await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.node_results.is_empty());
}

#[tokio::test]
async fn test_previous_context_seeds_full_run() {
    let h = harness();
    let (_, context) = h
        .executor
        .execute_with_context(&linear_workflow(), ExecuteOptions::default())
        .await;

    let workflow = chain(vec![log_node("only").with_config("message", "{{ $vars.counter }}")]);
    let execution = h
        .executor
        .execute_with(
            &workflow,
            ExecuteOptions::default().with_previous_context(Some(context)),
        )
        .await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 1);
    assert_eq!(execution.node_results[0].data["message"], json!(42));
}

#[tokio::test]
async fn test_concurrent_runs_share_one_executor() {
    let h = harness();
    let workflow = chain(vec![WorkflowNode::with_id("only", "test.trigger")]);

    let (a, b) = tokio::join!(
        h.executor.execute(&workflow, json!({"who": "a"}), "manual"),
        h.executor.execute(&workflow, json!({"who": "b"}), "manual"),
    );

    assert_ne!(a.id, b.id);
    assert_eq!(a.node_results[0].data, json!({"who": "a"}));
    assert_eq!(b.node_results[0].data, json!({"who": "b"}));
}

#[tokio::test]
async fn test_breakpoint_pauses_until_resume() {
    let h = harness();
    let workflow = Arc::new(chain(vec![log_node("node1"), log_node("node2"), log_node("node3")]));
    let controller = Arc::new(DebugController::new(h.executor.clone()).with_breakpoints(["node2"]));
    let handle = controller.handle();

    let run = {
        let controller = controller.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move { controller.execute(&workflow, ExecuteOptions::default()).await })
    };

    let paused_at = timeout(Duration::from_secs(5), handle.wait_for_pause())
        .await
        .expect("run never paused");
    assert_eq!(paused_at, "node2");
    assert!(handle.is_paused());
    assert_eq!(*h.journal.lock().unwrap(), vec!["node1"]);

    handle.resume();
    let execution = timeout(Duration::from_secs(5), run)
        .await
        .expect("run never finished")
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 3);
    assert!(!handle.is_paused());
}

#[tokio::test]
async fn test_step_mode_pauses_before_every_node() {
    let h = harness();
    let workflow = Arc::new(chain(vec![log_node("node1"), log_node("node2"), log_node("node3")]));
    let controller = Arc::new(DebugController::new(h.executor.clone()));
    controller.set_step_mode(true);
    let handle = controller.handle();

    let run = {
        let controller = controller.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move { controller.execute(&workflow, ExecuteOptions::default()).await })
    };

    assert_eq!(handle.wait_for_pause().await, "node1");
    handle.step();
    assert_eq!(handle.wait_for_pause().await, "node2");
    assert_eq!(*h.journal.lock().unwrap(), vec!["node1"]);
    handle.resume();

    let execution = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(*h.journal.lock().unwrap(), vec!["node1", "node2", "node3"]);
}

#[tokio::test]
async fn test_cancel_while_paused() {
    let h = harness();
    let workflow = Arc::new(chain(vec![log_node("node1"), log_node("node2")]));
    let controller = Arc::new(DebugController::new(h.executor.clone()).with_breakpoints(["node2"]));
    let handle = controller.handle();

    let run = {
        let controller = controller.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move { controller.execute(&workflow, ExecuteOptions::default()).await })
    };

    handle.wait_for_pause().await;
    handle.cancel();

    let execution = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.node_results.len(), 1);
    assert!(execution.completed_at.is_some());
}

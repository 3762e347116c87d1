// crates/flownodes/tests/handlers_test.rs

use flowcore::{Context, ExecutionStatus, Handler, HandlerError, Value, ValueMap, Workflow, WorkflowNode};
use flownodes::{standard_registry, Delay, JsonParse, JsonStringify, SetVariable};
use flowruntime::WorkflowExecutor;
use serde_json::json;
use std::sync::Arc;

fn config(value: Value) -> ValueMap {
    value.as_object().cloned().expect("config must be an object")
}

#[test]
fn test_standard_registry_contents() {
    let registry = standard_registry();
    assert_eq!(
        registry.list_handler_types(),
        vec![
            "debug.log",
            "http.request",
            "time.delay",
            "transform.json_parse",
            "transform.json_stringify",
            "trigger.manual",
            "variable.set",
        ]
    );
    assert_eq!(registry.get_metadata("http.request").unwrap().category, "http");
}

#[tokio::test]
async fn test_set_variable_accepts_both_shapes() {
    let mut context = Context::for_run(json!({}), ValueMap::new());

    SetVariable
        .execute(config(json!({"counter": 42, "on_error": "continue"})), &mut context)
        .await
        .unwrap();
    SetVariable
        .execute(config(json!({"variables": {"name": "ann"}})), &mut context)
        .await
        .unwrap();

    assert_eq!(context.var("counter"), Some(&json!(42)));
    assert_eq!(context.var("name"), Some(&json!("ann")));
    assert_eq!(context.var("on_error"), None);
}

#[tokio::test]
async fn test_json_round_trip_handlers() {
    let mut context = Context::new();
    let text = JsonStringify
        .execute(config(json!({"value": {"a": [1, 2]}})), &mut context)
        .await
        .unwrap();
    assert_eq!(text, json!("{\"a\":[1,2]}"));

    let parsed = JsonParse
        .execute(config(json!({"json": text})), &mut context)
        .await
        .unwrap();
    assert_eq!(parsed, json!({"a": [1, 2]}));

    let err = JsonParse
        .execute(config(json!({"json": "{oops"})), &mut context)
        .await
        .unwrap_err();
    assert!(matches!(err, HandlerError::ExecutionFailed(msg) if msg.starts_with("JSON parse error")));
}

#[tokio::test]
async fn test_delay_passes_prev_through() {
    let mut context = Context::new();
    context.record_output(&"earlier".to_string(), json!({"kept": true}));

    let out = Delay
        .execute(config(json!({"delay_ms": 5})), &mut context)
        .await
        .unwrap();
    assert_eq!(out, json!({"kept": true}));

    assert!(Delay
        .execute(config(json!({"delay_ms": -1})), &mut context)
        .await
        .is_err());
}

#[tokio::test]
async fn test_linear_workflow_with_standard_handlers() {
    let mut workflow = Workflow::new("standard");
    workflow.add_node(WorkflowNode::with_id("start", "trigger.manual"));
    workflow.add_node(WorkflowNode::with_id("set", "variable.set").with_config("counter", 42));
    workflow.add_node(
        WorkflowNode::with_id("log", "debug.log").with_config("message", "counter is {{ $vars.counter }}"),
    );
    workflow.add_node(
        WorkflowNode::with_id("encode", "transform.json_stringify")
            .with_config("value", "{{ $nodes.start }}"),
    );
    workflow.connect("start", "set");
    workflow.connect("set", "log");
    workflow.connect("log", "encode");

    let executor = WorkflowExecutor::new(Arc::new(standard_registry()));
    let execution = executor.execute(&workflow, json!({"id": 7}), "manual").await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 4);
    assert_eq!(
        execution.result_for("log").unwrap().data,
        json!({"message": "counter is 42"})
    );
    assert_eq!(execution.result_for("encode").unwrap().data, json!("{\"id\":7}"));
}

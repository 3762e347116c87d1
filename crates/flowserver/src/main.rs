use actix_cors::Cors;
use actix_web::{
    delete, get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use actix_ws::Message;
use flowcore::{Context, ExpressionEngine, Value, ValueMap, Workflow, WorkflowExecution};
use flowruntime::{DebugController, DebugHandle, ExecuteOptions, FlowRuntime, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// A debug run in progress (or finished) on the server
struct DebugSession {
    workflow_id: String,
    handle: DebugHandle,
    execution: Arc<RwLock<Option<WorkflowExecution>>>,
}

/// Application state shared across handlers
struct AppState {
    runtime: Arc<FlowRuntime>,
    sessions: RwLock<HashMap<String, DebugSession>>,
    /// How long a finished debug session stays readable before it is dropped
    session_retention: Duration,
}

const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(300);

/// Request body for workflow execution
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecuteRequest {
    trigger_data: Option<Value>,
    trigger_type: Option<String>,
    resume_from: Option<String>,
    previous_context: Option<Context>,
}

impl ExecuteRequest {
    fn into_options(self) -> ExecuteOptions {
        let options = ExecuteOptions::new(
            self.trigger_data
                .unwrap_or_else(|| Value::Object(ValueMap::new())),
        );
        let options = match self.trigger_type {
            Some(trigger_type) => options.with_trigger_type(trigger_type),
            None => options,
        };
        match self.resume_from {
            Some(node_id) => options.resume_from(node_id, self.previous_context),
            None => options.with_previous_context(self.previous_context),
        }
    }
}

/// Request body for starting a debug session
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DebugRequest {
    #[serde(flatten)]
    execute: ExecuteRequest,
    breakpoints: Vec<String>,
    step: bool,
}

#[derive(Debug, Deserialize)]
struct BreakpointRequest {
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    expression: String,
    #[serde(default)]
    context: ValueMap,
}

/// Response for workflow creation
#[derive(Debug, Serialize)]
struct WorkflowResponse {
    id: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct DebugStatus {
    session_id: String,
    workflow_id: String,
    paused: bool,
    paused_at: Option<String>,
    step_mode: bool,
    breakpoints: Vec<String>,
    execution: Option<WorkflowExecution>,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(what: &str, id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("{} {} not found", what, id),
    })
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "flowengine"
    }))
}

/// List all workflows
#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let workflow_list: Vec<_> = data
        .runtime
        .list_workflows()
        .await
        .iter()
        .map(|w| {
            serde_json::json!({
                "id": w.id,
                "name": w.name,
                "description": w.description,
                "nodes": w.nodes.len(),
                "connections": w.connections.len(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(workflow_list))
}

/// Create a new workflow
#[post("/api/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();
    info!("Creating workflow: {} ({})", workflow.name, workflow.id);

    match data.runtime.register_workflow(workflow).await {
        Ok(id) => Ok(HttpResponse::Created().json(WorkflowResponse {
            id,
            message: "Workflow created successfully".to_string(),
        })),
        Err(e) => {
            warn!("Rejected workflow: {}", e);
            Ok(HttpResponse::BadRequest().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
    }
}

/// Get a specific workflow
#[get("/api/workflows/{id}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    match data.runtime.get_workflow(&workflow_id).await {
        Some(workflow) => Ok(HttpResponse::Ok().json(workflow)),
        None => Ok(not_found("Workflow", &workflow_id)),
    }
}

/// Delete a workflow
#[delete("/api/workflows/{id}")]
async fn delete_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    match data.runtime.remove_workflow(&workflow_id).await {
        Some(_) => {
            info!("Deleted workflow: {}", workflow_id);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Workflow deleted successfully"
            })))
        }
        None => Ok(not_found("Workflow", &workflow_id)),
    }
}

/// Execute a workflow and wait for the execution record
#[post("/api/workflows/{id}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: Option<web::Json<ExecuteRequest>>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let options = req.map(|r| r.into_inner()).unwrap_or_default().into_options();

    info!("Executing workflow: {}", workflow_id);

    let Some(workflow) = data.runtime.get_workflow(&workflow_id).await else {
        return Ok(not_found("Workflow", &workflow_id));
    };

    let execution = data.runtime.executor().execute_with(&workflow, options).await;
    if let Some(err) = &execution.error {
        error!("Workflow {} execution {}: {}", workflow_id, execution.status, err);
    }
    Ok(HttpResponse::Ok().json(execution))
}

/// Start a debug run; it pauses at the given breakpoints
#[post("/api/workflows/{id}/debug")]
async fn start_debug(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: Option<web::Json<DebugRequest>>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let req = req.map(|r| r.into_inner()).unwrap_or_default();

    let Some(workflow) = data.runtime.get_workflow(&workflow_id).await else {
        return Ok(not_found("Workflow", &workflow_id));
    };

    let controller = Arc::new(data.runtime.debugger().with_breakpoints(req.breakpoints));
    controller.set_step_mode(req.step);

    let session_id = Uuid::new_v4().to_string();
    let execution = Arc::new(RwLock::new(None));
    let session = DebugSession {
        workflow_id: workflow_id.clone(),
        handle: controller.handle(),
        execution: execution.clone(),
    };
    data.sessions.write().await.insert(session_id.clone(), session);

    let options = req.execute.into_options();
    actix_web::rt::spawn(run_debug_session(
        data.clone(),
        session_id.clone(),
        controller,
        workflow,
        options,
        execution,
    ));

    info!("Debug session {} started for workflow {}", session_id, workflow_id);
    Ok(HttpResponse::Created().json(serde_json::json!({ "session_id": session_id })))
}

async fn run_debug_session(
    data: web::Data<AppState>,
    session_id: String,
    controller: Arc<DebugController>,
    workflow: Workflow,
    options: ExecuteOptions,
    slot: Arc<RwLock<Option<WorkflowExecution>>>,
) {
    let execution = controller.execute(&workflow, options).await;
    info!("Debug session {} finished: {}", session_id, execution.status);
    *slot.write().await = Some(execution);

    tokio::time::sleep(data.session_retention).await;

    // The id may have been closed and reused in the meantime
    let mut sessions = data.sessions.write().await;
    if sessions
        .get(&session_id)
        .is_some_and(|session| Arc::ptr_eq(&session.execution, &slot))
    {
        sessions.remove(&session_id);
        info!("Debug session {} expired", session_id);
    }
}

async fn debug_status(session_id: &str, session: &DebugSession) -> DebugStatus {
    DebugStatus {
        session_id: session_id.to_string(),
        workflow_id: session.workflow_id.clone(),
        paused: session.handle.is_paused(),
        paused_at: session.handle.paused_at(),
        step_mode: session.handle.step_mode(),
        breakpoints: session.handle.breakpoints_list(),
        execution: session.execution.read().await.clone(),
    }
}

#[get("/api/debug/{session}")]
async fn get_debug_session(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let session_id = path.into_inner();
    let sessions = data.sessions.read().await;
    match sessions.get(&session_id) {
        Some(session) => Ok(HttpResponse::Ok().json(debug_status(&session_id, session).await)),
        None => Ok(not_found("Debug session", &session_id)),
    }
}

/// Drive a paused session: `resume`, `step` or `cancel`
#[post("/api/debug/{session}/{action}")]
async fn control_debug_session(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ActixResult<impl Responder> {
    let (session_id, action) = path.into_inner();
    let sessions = data.sessions.read().await;
    let Some(session) = sessions.get(&session_id) else {
        return Ok(not_found("Debug session", &session_id));
    };

    match action.as_str() {
        "resume" => session.handle.resume(),
        "step" => session.handle.step(),
        "cancel" => session.handle.cancel(),
        other => {
            return Ok(HttpResponse::BadRequest().json(ErrorResponse {
                error: format!("Unknown debug action: {}", other),
            }))
        }
    }

    info!("Debug session {}: {}", session_id, action);
    Ok(HttpResponse::Ok().json(debug_status(&session_id, session).await))
}

#[post("/api/debug/{session}/breakpoints")]
async fn add_breakpoint(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<BreakpointRequest>,
) -> ActixResult<impl Responder> {
    let session_id = path.into_inner();
    let sessions = data.sessions.read().await;
    let Some(session) = sessions.get(&session_id) else {
        return Ok(not_found("Debug session", &session_id));
    };
    session.handle.add_breakpoint(req.into_inner().node_id);
    Ok(HttpResponse::Ok().json(session.handle.breakpoints_list()))
}

#[delete("/api/debug/{session}/breakpoints/{node_id}")]
async fn remove_breakpoint(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ActixResult<impl Responder> {
    let (session_id, node_id) = path.into_inner();
    let sessions = data.sessions.read().await;
    let Some(session) = sessions.get(&session_id) else {
        return Ok(not_found("Debug session", &session_id));
    };
    session.handle.remove_breakpoint(&node_id);
    Ok(HttpResponse::Ok().json(session.handle.breakpoints_list()))
}

/// Close a session, cancelling the run if it is still going
#[delete("/api/debug/{session}")]
async fn end_debug_session(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let session_id = path.into_inner();
    match data.sessions.write().await.remove(&session_id) {
        Some(session) => {
            session.handle.cancel();
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Debug session closed" })))
        }
        None => Ok(not_found("Debug session", &session_id)),
    }
}

/// Evaluate an expression, as an editor preview would
#[post("/api/expressions/evaluate")]
async fn evaluate_expression(req: web::Json<EvaluateRequest>) -> ActixResult<impl Responder> {
    let req = req.into_inner();
    let engine = ExpressionEngine::new();
    let template = if flowcore::expression::contains_expression(&req.expression) {
        req.expression
    } else {
        format!("{{{{ {} }}}}", req.expression)
    };

    match engine.resolve_str(&template, &req.context) {
        Ok(value) => Ok(HttpResponse::Ok().json(serde_json::json!({ "value": value }))),
        Err(e) => Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged, dropped {} events", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let nodes: Vec<_> = registry
        .list_handler_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type).unwrap_or_default();
            serde_json::json!({
                "type": node_type,
                "description": metadata.description,
                "category": metadata.category,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

fn app_state(runtime: FlowRuntime, session_retention: Duration) -> web::Data<AppState> {
    web::Data::new(AppState {
        runtime: Arc::new(runtime),
        sessions: RwLock::new(HashMap::new()),
        session_retention,
    })
}

fn session_retention_from_env() -> Duration {
    match std::env::var("DEBUG_SESSION_RETENTION_SECS") {
        Ok(raw) => raw.parse().map(Duration::from_secs).unwrap_or_else(|_| {
            warn!("Invalid DEBUG_SESSION_RETENTION_SECS '{}', using default", raw);
            DEFAULT_SESSION_RETENTION
        }),
        Err(_) => DEFAULT_SESSION_RETENTION,
    }
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_workflows)
        .service(create_workflow)
        .service(get_workflow)
        .service(delete_workflow)
        .service(execute_workflow)
        .service(start_debug)
        .service(add_breakpoint)
        .service(remove_breakpoint)
        .service(get_debug_session)
        .service(control_debug_session)
        .service(end_debug_session)
        .service(evaluate_expression)
        .service(websocket_events)
        .service(list_node_types);
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting Flow Engine Server");

    let runtime = FlowRuntime::with_registry(flownodes::standard_registry(), RuntimeConfig::from_env());
    info!("✅ Runtime initialized with standard handlers");

    let app_state = app_state(runtime, session_retention_from_env());

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use flowcore::{ExecutionStatus, WorkflowNode};
    use serde_json::json;

    fn sample_workflow() -> Workflow {
        let mut workflow = Workflow::new("sample");
        workflow.add_node(WorkflowNode::with_id("start", "trigger.manual"));
        workflow.add_node(WorkflowNode::with_id("set", "variable.set").with_config("counter", 42));
        workflow.add_node(
            WorkflowNode::with_id("log", "debug.log").with_config("message", "{{ $vars.counter }}"),
        );
        workflow.connect("start", "set");
        workflow.connect("set", "log");
        workflow
    }

    fn state_with_retention(retention: Duration) -> web::Data<AppState> {
        app_state(
            FlowRuntime::with_registry(flownodes::standard_registry(), RuntimeConfig::default()),
            retention,
        )
    }

    fn state() -> web::Data<AppState> {
        state_with_retention(DEFAULT_SESSION_RETENTION)
    }

    #[actix_web::test]
    async fn test_create_and_execute() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let workflow = sample_workflow();

        let req = test::TestRequest::post()
            .uri("/api/workflows")
            .set_json(&workflow)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri(&format!("/api/workflows/{}/execute", workflow.id))
            .set_json(json!({"trigger_data": {"id": 1}}))
            .to_request();
        let execution: WorkflowExecution = test::call_and_read_body_json(&app, req).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.node_results.len(), 3);
    }

    #[actix_web::test]
    async fn test_cyclic_workflow_is_rejected() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let mut workflow = sample_workflow();
        workflow.connect("log", "start");

        let req = test::TestRequest::post()
            .uri("/api/workflows")
            .set_json(&workflow)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_debug_session_pauses_and_resumes() {
        let data = state();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let workflow = sample_workflow();
        data.runtime.register_workflow(workflow.clone()).await.unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/workflows/{}/debug", workflow.id))
            .set_json(json!({"breakpoints": ["set"]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let handle = data.sessions.read().await[&session_id].handle.clone();
        assert_eq!(handle.wait_for_pause().await, "set");

        let req = test::TestRequest::post()
            .uri(&format!("/api/debug/{}/resume", session_id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let slot = data.sessions.read().await[&session_id].execution.clone();
        let execution = loop {
            if let Some(execution) = slot.read().await.clone() {
                break execution;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[actix_web::test]
    async fn test_finished_debug_session_expires() {
        let data = state_with_retention(Duration::ZERO);
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let workflow = sample_workflow();
        data.runtime.register_workflow(workflow.clone()).await.unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/workflows/{}/debug", workflow.id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while data.sessions.read().await.contains_key(&session_id) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never expired");

        let req = test::TestRequest::get()
            .uri(&format!("/api/debug/{}", session_id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[::core::prelude::v1::test]
    fn test_previous_context_kept_without_resume() {
        let mut previous = Context::new();
        previous.set_var("counter", json!(7));
        let request = ExecuteRequest {
            previous_context: Some(previous),
            ..Default::default()
        };

        let options = request.into_options();
        assert!(options.resume_from.is_none());
        assert_eq!(options.previous_context.unwrap().var("counter"), Some(&json!(7)));
    }

    #[actix_web::test]
    async fn test_evaluate_endpoint() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/expressions/evaluate")
            .set_json(json!({"expression": "$vars.x * 2", "context": {"$vars": {"x": 21}}}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["value"], json!(42));
    }
}

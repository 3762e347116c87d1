use crate::debug::DebugController;
use crate::executor::{ExecuteOptions, WorkflowExecutor};
use crate::registry::HandlerRegistry;
use flowcore::{
    graph, Context, EventBus, ExecutionEvent, ExpressionEngine, FlowError, Value, Workflow,
    WorkflowError, WorkflowExecution, WorkflowId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Main runtime for executing workflows
pub struct FlowRuntime {
    registry: Arc<HandlerRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

impl FlowRuntime {
    /// Create a runtime with no handlers registered
    pub fn new() -> Self {
        Self::with_registry(HandlerRegistry::new(), RuntimeConfig::default())
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: HandlerRegistry, config: RuntimeConfig) -> Self {
        let registry = Arc::new(registry);
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let executor = Arc::new(
            WorkflowExecutor::new(registry.clone())
                .with_engine(Arc::new(ExpressionEngine::new()))
                .with_event_bus(event_bus.clone()),
        );

        Self {
            registry,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }

    /// Validate and register a workflow, replacing any with the same id
    pub async fn register_workflow(&self, workflow: Workflow) -> Result<WorkflowId, FlowError> {
        graph::validate(&workflow)?;
        let id = workflow.id.clone();
        self.workflows.write().await.insert(id.clone(), workflow);
        Ok(id)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows.read().await.get(workflow_id).cloned()
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        workflows
    }

    pub async fn remove_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows.write().await.remove(workflow_id)
    }

    /// Execute a registered workflow by ID
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        options: ExecuteOptions,
    ) -> Result<WorkflowExecution, FlowError> {
        let workflow = self
            .get_workflow(workflow_id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;

        Ok(self.executor.execute_with(&workflow, options).await)
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(&self, workflow: &Workflow, trigger_data: Value) -> WorkflowExecution {
        self.executor.execute(workflow, trigger_data, "manual").await
    }

    pub async fn execute_with_context(
        &self,
        workflow: &Workflow,
        options: ExecuteOptions,
    ) -> (WorkflowExecution, Context) {
        self.executor.execute_with_context(workflow, options).await
    }

    /// Start a debug session sharing this runtime's handlers and event bus
    pub fn debugger(&self) -> DebugController {
        DebugController::new(self.executor.clone())
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub const EVENT_BUFFER_ENV: &'static str = "FLOW_EVENT_BUFFER";

    /// Defaults overridden by `FLOW_EVENT_BUFFER` when it holds a positive integer
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(Self::EVENT_BUFFER_ENV) {
            match raw.parse::<usize>() {
                Ok(size) if size > 0 => config.event_buffer_size = size,
                _ => tracing::warn!(
                    "Ignoring invalid {}={:?}, using {}",
                    Self::EVENT_BUFFER_ENV,
                    raw,
                    config.event_buffer_size
                ),
            }
        }
        config
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}

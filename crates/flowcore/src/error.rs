use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    /// Dispatch-time problems such as an unregistered node type.
    #[error("Validation error: {0}")]
    Validation(#[from] WorkflowError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Unexpected failure inside the orchestration loop itself.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Invalid config for '{field}': expected {expected}, got {actual}")]
    InvalidConfig {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected among nodes: {}", .nodes.join(", "))]
    CyclicDependency { nodes: Vec<String> },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid connection {connection}: {reason}")]
    InvalidConnection { connection: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' failed: {cause}")]
    Function { name: String, cause: String },
}

use crate::{Value, ValueMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;

/// Complete workflow definition
///
/// Authored by an external editor and handed to the executor as an
/// immutable snapshot for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connections: Vec<WorkflowConnection>,
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default)]
    pub settings: ValueMap,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            version: default_version(),
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: ValueMap::new(),
            settings: ValueMap::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect `source`'s default output port to `target`'s default input port.
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        self.connections
            .push(WorkflowConnection::new(source.into(), target.into()));
    }

    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// One configured step, bound to a handler through `node_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    /// Editor-only layout data, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default)]
    pub config: ValueMap,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl WorkflowNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), node_type)
    }

    pub fn with_id(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            position: None,
            config: ValueMap::new(),
            enabled: true,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(serde_json::json!({ "x": x, "y": y }));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Raw `on_error` policy string from config, defaulting to `"stop"`.
    pub fn on_error(&self) -> &str {
        self.config
            .get("on_error")
            .and_then(|v| v.as_str())
            .unwrap_or("stop")
    }
}

/// Directed edge from one node's output port to another's input port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConnection {
    pub id: String,
    pub source_node_id: NodeId,
    #[serde(default = "default_source_port")]
    pub source_port: String,
    pub target_node_id: NodeId,
    #[serde(default = "default_target_port")]
    pub target_port: String,
}

fn default_source_port() -> String {
    "output".to_string()
}

fn default_target_port() -> String {
    "input".to_string()
}

impl WorkflowConnection {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_node_id: source,
            source_port: default_source_port(),
            target_node_id: target,
            target_port: default_target_port(),
        }
    }
}

use crate::{NodeId, Value, ValueMap};
use serde::{Deserialize, Serialize};

pub const TRIGGER: &str = "$trigger";
pub const PREV: &str = "$prev";
pub const VARS: &str = "$vars";
pub const NODES: &str = "$nodes";
pub const WORKFLOW: &str = "$workflow";
pub const EXECUTION: &str = "$execution";
/// Node name → node id lookup used by `$nodes.<name>` paths.
pub const NODE_NAMES: &str = "$node_names";

/// Mutable per-run state bag threaded through every node invocation.
///
/// Handlers receive it by `&mut` and may read or write any key. This is only
/// sound because nodes run strictly one after another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: ValueMap,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fresh run context from trigger data and workflow variables.
    pub fn for_run(trigger_data: Value, variables: ValueMap) -> Self {
        let mut ctx = Self::new();
        ctx.set(TRIGGER, trigger_data);
        ctx.set(VARS, Value::Object(variables));
        ctx.set(NODES, Value::Object(ValueMap::new()));
        ctx
    }

    pub fn from_map(values: ValueMap) -> Self {
        Self { values }
    }

    pub fn as_map(&self) -> &ValueMap {
        &self.values
    }

    pub fn into_map(self) -> ValueMap {
        self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn trigger(&self) -> &Value {
        self.values.get(TRIGGER).unwrap_or(&Value::Null)
    }

    pub fn prev(&self) -> &Value {
        self.values.get(PREV).unwrap_or(&Value::Null)
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.values.get(VARS)?.as_object()?.get(name)
    }

    /// Set a workflow variable, creating `$vars` if a handler clobbered it.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        object_entry(&mut self.values, VARS).insert(name.into(), value);
    }

    pub fn node_output(&self, node_id: &str) -> Option<&Value> {
        self.values.get(NODES)?.as_object()?.get(node_id)
    }

    /// Record a node's output under `$nodes[id]` and make it `$prev`.
    pub fn record_output(&mut self, node_id: &NodeId, output: Value) {
        object_entry(&mut self.values, NODES).insert(node_id.clone(), output.clone());
        self.values.insert(PREV.to_string(), output);
    }

    pub fn register_node_name(&mut self, name: &str, node_id: &NodeId) {
        if name.is_empty() {
            return;
        }
        object_entry(&mut self.values, NODE_NAMES)
            .entry(name.to_string())
            .or_insert_with(|| Value::String(node_id.clone()));
    }
}

fn object_entry<'a>(values: &'a mut ValueMap, key: &str) -> &'a mut ValueMap {
    let slot = values
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(ValueMap::new()));
    if !slot.is_object() {
        *slot = Value::Object(ValueMap::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

impl From<ValueMap> for Context {
    fn from(values: ValueMap) -> Self {
        Self::from_map(values)
    }
}

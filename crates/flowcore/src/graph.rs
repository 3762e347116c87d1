//! Topological ordering and structural validation of workflow graphs.
//!
//! Ordering is Kahn's algorithm seeded in `nodes[]` order, so two runs of the
//! same workflow always visit nodes in the same sequence.

use crate::{NodeId, Workflow, WorkflowError};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Best-effort topological order.
///
/// Nodes that sit on a cycle, or downstream of one, never reach in-degree zero
/// and are left out of the result. Connections naming unknown nodes are ignored.
pub fn partial_order(workflow: &Workflow) -> Vec<NodeId> {
    let mut ids: Vec<&str> = Vec::with_capacity(workflow.nodes.len());
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in &workflow.nodes {
        if in_degree.insert(node.id.as_str(), 0).is_none() {
            ids.push(node.id.as_str());
        }
    }

    for conn in &workflow.connections {
        let source = conn.source_node_id.as_str();
        let target = conn.target_node_id.as_str();
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            continue;
        }
        adjacency.entry(source).or_default().push(target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = ids
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted = Vec::with_capacity(ids.len());
    while let Some(id) = queue.pop_front() {
        sorted.push(id.to_string());
        for &next in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    sorted
}

/// Strict topological order.
///
/// # Errors
/// [`WorkflowError::CyclicDependency`] naming every node that could not be
/// ordered.
pub fn order(workflow: &Workflow) -> Result<Vec<NodeId>, WorkflowError> {
    let sorted = partial_order(workflow);

    let placed: HashSet<&str> = sorted.iter().map(String::as_str).collect();
    let mut missing: Vec<String> = Vec::new();
    for node in &workflow.nodes {
        if !placed.contains(node.id.as_str()) && !missing.contains(&node.id) {
            missing.push(node.id.clone());
        }
    }

    if missing.is_empty() {
        Ok(sorted)
    } else {
        Err(WorkflowError::CyclicDependency { nodes: missing })
    }
}

/// Check the structural invariants of a workflow definition.
///
/// Reports the first problem found: duplicate node ids, connections whose
/// endpoints don't exist, then cycles (naming the nodes on the cycle).
pub fn validate(workflow: &Workflow) -> Result<(), WorkflowError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(WorkflowError::DuplicateNode(node.id.clone()));
        }
    }

    for conn in &workflow.connections {
        for (side, id) in [("source", &conn.source_node_id), ("target", &conn.target_node_id)] {
            if !seen.contains(id.as_str()) {
                return Err(WorkflowError::InvalidConnection {
                    connection: conn.id.clone(),
                    reason: format!("{} node '{}' does not exist", side, id),
                });
            }
        }
    }

    if let Some(nodes) = find_cycle(workflow) {
        return Err(WorkflowError::CyclicDependency { nodes });
    }

    Ok(())
}

/// Nodes forming the first strongly connected cycle, in `nodes[]` order.
pub fn find_cycle(workflow: &Workflow) -> Option<Vec<NodeId>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &workflow.nodes {
        index
            .entry(node.id.as_str())
            .or_insert_with(|| graph.add_node(node.id.as_str()));
    }
    for conn in &workflow.connections {
        if let (Some(&from), Some(&to)) = (
            index.get(conn.source_node_id.as_str()),
            index.get(conn.target_node_id.as_str()),
        ) {
            graph.add_edge(from, to, ());
        }
    }

    let component = tarjan_scc(&graph).into_iter().find(|scc| {
        scc.len() > 1 || scc.first().is_some_and(|&n| graph.contains_edge(n, n))
    })?;

    let members: HashSet<&str> = component.iter().map(|&idx| graph[idx]).collect();
    Some(
        workflow
            .nodes
            .iter()
            .filter(|n| members.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect(),
    )
}

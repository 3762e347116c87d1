use crate::{NodeId, Value, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ExecutionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Record of one workflow run, filled in place while the run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub trigger_type: String,
    pub trigger_data: Value,
    pub node_results: Vec<ExecutionResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn start(
        workflow_id: impl Into<WorkflowId>,
        trigger_type: impl Into<String>,
        trigger_data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            trigger_type: trigger_type.into(),
            trigger_data,
            node_results: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Mark the run failed unless it already reached a terminal state.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Failed;
            self.error = Some(message.into());
        }
    }

    /// Stamp `completed_at` and `duration_ms`.
    pub fn finish(&mut self) {
        let now = Utc::now();
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.completed_at = Some(now);
        self.duration_ms = Some(elapsed);
    }

    pub fn result_for(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.node_results.iter().find(|r| r.node_id == node_id)
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Outcome of one attempted node. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub node_id: NodeId,
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(
        node_id: impl Into<NodeId>,
        data: Value,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            success: true,
            data,
            error: None,
            duration_ms,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        node_id: impl Into<NodeId>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            duration_ms,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fail_does_not_override_terminal_status() {
        let mut execution = WorkflowExecution::start("wf", "manual", json!({}));
        execution.status = ExecutionStatus::Cancelled;
        execution.fail("late error");
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        assert!(execution.error.is_none());
    }

    #[test]
    fn finish_stamps_timing() {
        let mut execution = WorkflowExecution::start("wf", "manual", json!(null));
        execution.finish();
        assert!(execution.completed_at.is_some());
        assert!(execution.duration_ms.is_some());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Completed).unwrap(),
            json!("completed")
        );
    }
}

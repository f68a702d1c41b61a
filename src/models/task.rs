use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a task: `pending -> running -> {succeeded | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Reindex,
    Archive,
    LogCleanup,
    /// Reserved for bulk exports; no worker consumes it yet.
    Export,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Reindex => "reindex",
            TaskType::Archive => "archive",
            TaskType::LogCleanup => "log_cleanup",
            TaskType::Export => "export",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbox record tracking one asynchronous unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub task_type: TaskType,
    /// `None` for cross-tenant administrative tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// New pending task with a fresh identifier.
    pub fn pending(task_type: TaskType, tenant_id: Option<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            task_type,
            tenant_id: tenant_id.filter(|tenant| !tenant.is_empty()),
            user_id: user_id.into(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Maps a caller tenant to a task/query scope. An empty tenant means "all tenants".
pub fn tenant_scope(tenant_id: &str) -> Option<String> {
    if tenant_id.is_empty() {
        None
    } else {
        Some(tenant_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_terminal_states_never_move() {
        for terminal in [TaskStatus::Succeeded, TaskStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Succeeded,
                TaskStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Succeeded));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_task_type_wire_names() {
        let json = serde_json::to_string(&TaskType::LogCleanup).unwrap();
        assert_eq!(json, "\"log_cleanup\"");
        let parsed: TaskType = serde_json::from_str("\"reindex\"").unwrap();
        assert_eq!(parsed, TaskType::Reindex);
    }

    #[test]
    fn test_pending_task_normalizes_empty_tenant() {
        let task = Task::pending(TaskType::Archive, Some(String::new()), "admin");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.tenant_id.is_none());
        assert!(task.error_message.is_none());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_tenant_scope() {
        assert_eq!(tenant_scope(""), None);
        assert_eq!(tenant_scope("acme"), Some("acme".to_string()));
    }
}

//! Task types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet claimed
    Pending,
    /// Claimed and executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Aborted before completion
    Cancelled,
}

impl TaskStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status is terminal; terminal tasks are immutable
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work assigned to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    pub id: String,
    /// Agent the task is assigned to
    pub assignee_id: String,
    /// Free-form task type tag
    pub task_type: String,
    /// What the task is about
    pub description: String,
    /// Priority; larger runs sooner among pending tasks
    pub priority: i32,
    /// Current status
    pub status: TaskStatus,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Result body on completion
    pub result: Option<String>,
    /// Error description on failure or cancellation
    pub error: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Request to create a task
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Explicit assignee; `None` lets the distribution strategy pick
    pub assignee_id: Option<String>,
    /// Free-form task type tag
    pub task_type: String,
    /// What the task is about
    pub description: String,
    /// Priority; larger runs sooner among pending tasks
    pub priority: i32,
    /// Free-form metadata
    pub metadata: serde_json::Value,
}

impl TaskRequest {
    /// A request for `task_type` with default priority and no assignee
    #[must_use]
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            assignee_id: None,
            task_type: task_type.into(),
            description: description.into(),
            priority: 0,
            metadata: serde_json::json!({}),
        }
    }

    /// Pin the request to a specific agent
    #[must_use]
    pub fn with_assignee(mut self, agent_id: impl Into<String>) -> Self {
        self.assignee_id = Some(agent_id.into());
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

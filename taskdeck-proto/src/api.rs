//! Request and response payloads for the task service.
//!
//! Raw caller input arrives in these shapes before validation. Due dates are
//! carried as `f64` milliseconds here because callers may send values that
//! are not valid timestamps (NaN, negative, fractional); validation turns
//! them into [`Timestamp`](crate::task::Timestamp)s.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskPriority, TaskStatus};

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Raw, untrimmed title.
    pub title: String,
    /// Raw description.
    #[serde(default)]
    pub description: Option<String>,
    /// Initial status (defaults to `todo`).
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Optional priority.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Due date in epoch milliseconds.
    #[serde(default)]
    pub due_date: Option<f64>,
}

impl CreateTaskRequest {
    /// A request carrying only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for an existing task. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    /// Replacement title.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement description.
    #[serde(default)]
    pub description: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// New due date in epoch milliseconds.
    #[serde(default)]
    pub due_date: Option<f64>,
}

/// Result of a create or update: the stored task plus non-fatal notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWrite {
    /// The task as stored after the write.
    pub task: Task,
    /// Human-readable warnings (e.g. a due date in the past).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of deleting all completed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCompletedResponse {
    /// Number of tasks removed.
    pub deleted_count: usize,
}

/// Query string for task listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Only return tasks in this status.
    pub status: Option<TaskStatus>,
}

/// Query string for upcoming-task listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpcomingQuery {
    /// Only return tasks due at or before this epoch-millisecond instant.
    pub before: Option<u64>,
}

/// Query string for the dashboard "recent" view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentQuery {
    /// Maximum number of tasks to return.
    pub limit: Option<usize>,
}

/// JSON error body returned by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Delay before retrying, set only for rate-limit rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

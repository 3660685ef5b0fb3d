use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::DbId;

/// A unit of work an intern performs within a project.
///
/// After creation a task only changes through status transitions. `Completed`
/// is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: DbId,
    pub project_id: DbId,
    pub intern_id: DbId,
    pub title: String,
    pub description: String,
    pub task_date: NaiveDate,
    pub deadline: Option<NaiveDate>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// A task is overdue when its deadline has passed and it is not completed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_completed() && self.deadline.is_some_and(|d| d < today)
    }
}

/// The execution status of a task.
///
/// - `Pending`: not yet started
/// - `InProgress`: being worked on (`in-progress` is accepted on input)
/// - `Completed`: finished, terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Input for creating a task on behalf of an intern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub project_id: DbId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to today (UTC).
    #[serde(default)]
    pub task_date: Option<NaiveDate>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

/// Input for moving a task to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskStatusInput {
    pub status: TaskStatus,
}

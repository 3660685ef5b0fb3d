use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DbId;

/// A unit of work that interns are assigned to.
///
/// Projects start `InProgress` and move to `Completed` either by an explicit
/// status change or automatically once every task under them is completed.
/// Completion is one-way: a completed project never returns to in-progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle status of a project.
///
/// - `InProgress`: initial state, interns may be assigned (`in-progress` is
///   accepted on input)
/// - `Completed`: terminal, no outgoing transition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        !matches!((self, next), (Self::Completed, Self::InProgress))
    }

    /// Human-readable label used in history narratives.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

/// Input for creating a new project. New projects always start in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
}

/// Input for changing a project's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProjectStatusInput {
    pub status: ProjectStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_cannot_return_to_in_progress() {
        assert!(!ProjectStatus::Completed.can_transition_to(ProjectStatus::InProgress));
    }

    #[test]
    fn forward_and_self_transitions_are_allowed() {
        assert!(ProjectStatus::InProgress.can_transition_to(ProjectStatus::Completed));
        assert!(ProjectStatus::InProgress.can_transition_to(ProjectStatus::InProgress));
        assert!(ProjectStatus::Completed.can_transition_to(ProjectStatus::Completed));
    }

    #[test]
    fn parses_both_in_progress_spellings() {
        assert_eq!(
            ProjectStatus::from_str("in-progress"),
            Some(ProjectStatus::InProgress)
        );
        assert_eq!(
            ProjectStatus::from_str("in_progress"),
            Some(ProjectStatus::InProgress)
        );
        assert_eq!(ProjectStatus::from_str("done"), None);
    }

    #[test]
    fn deserializes_both_in_progress_spellings() {
        let dashed: ProjectStatus = serde_json::from_str("\"in-progress\"").unwrap();
        let snake: ProjectStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(dashed, ProjectStatus::InProgress);
        assert_eq!(snake, ProjectStatus::InProgress);
        assert_eq!(serde_json::to_string(&dashed).unwrap(), "\"in_progress\"");
    }
}

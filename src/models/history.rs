use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DbId, ProjectStatus};

/// An append-only audit entry recording something that happened to a project.
///
/// Entries are never updated or deleted. Within a project they are listed in
/// insertion order, which is also timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    pub id: DbId,
    pub project_id: DbId,
    #[serde(flatten)]
    pub event: HistoryEvent,
    pub timestamp: DateTime<Utc>,
}

/// What a history entry records. Serialized with an `action` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryEvent {
    Assigned {
        intern_id: DbId,
    },
    Unassigned {
        intern_id: DbId,
    },
    StatusChanged {
        status: ProjectStatus,
        /// Set when the completion watcher, not an operator, made the change.
        #[serde(default)]
        automatic: bool,
    },
    /// Free-form narrative, e.g. the completion cascade's summary lines.
    Note {
        message: String,
    },
}

impl HistoryEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Assigned { .. } => "assigned",
            Self::Unassigned { .. } => "unassigned",
            Self::StatusChanged { .. } => "status_changed",
            Self::Note { .. } => "note",
        }
    }

    pub fn intern_id(&self) -> Option<DbId> {
        match self {
            Self::Assigned { intern_id } | Self::Unassigned { intern_id } => Some(*intern_id),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<ProjectStatus> {
        match self {
            Self::StatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Note { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::StatusChanged { automatic: true, .. })
    }

    /// Rebuild an event from its stored columns.
    ///
    /// Returns `None` when the action is unknown or a required column is missing.
    pub fn from_parts(
        action: &str,
        intern_id: Option<DbId>,
        status: Option<&str>,
        message: Option<String>,
        automatic: bool,
    ) -> Option<Self> {
        match action {
            "assigned" => intern_id.map(|intern_id| Self::Assigned { intern_id }),
            "unassigned" => intern_id.map(|intern_id| Self::Unassigned { intern_id }),
            "status_changed" => status
                .and_then(ProjectStatus::from_str)
                .map(|status| Self::StatusChanged { status, automatic }),
            "note" => message.map(|message| Self::Note { message }),
            _ => None,
        }
    }

    /// One-line narrative for audit views.
    pub fn describe(&self) -> String {
        match self {
            Self::Assigned { intern_id } => format!("Intern {} assigned", intern_id),
            Self::Unassigned { intern_id } => format!("Intern {} unassigned", intern_id),
            Self::StatusChanged { status, automatic } => {
                let suffix = if *automatic { " (automatic)" } else { "" };
                format!("Project status changed to '{}'{}", status.label(), suffix)
            }
            Self::Note { message } => message.clone(),
        }
    }
}

/// Input for appending a free-form note to a project's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendNoteInput {
    pub message: String,
}

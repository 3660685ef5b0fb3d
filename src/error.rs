//! Error kinds raised by the workflow core.

use thiserror::Error;

use crate::models::{DbId, ProjectStatus};

/// Failure reported by the data-access backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A distinguishable failure of a core operation.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Empty or malformed argument.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Attempted to move a completed project or task backwards.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// Attempted to unassign interns who still have open tasks in the project.
    #[error("cannot unassign interns {intern_ids:?} from project {project_id}: tasks are not completed")]
    GuardViolation {
        project_id: DbId,
        intern_ids: Vec<DbId>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn project_regression(from: ProjectStatus, to: ProjectStatus) -> Self {
        Self::IllegalTransition {
            from: format!("project status '{}'", from.as_str()),
            to: format!("'{}'", to.as_str()),
        }
    }

    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::GuardViolation { .. } => "guard_violation",
            Self::NotFound { .. } => "not_found",
            Self::Backend(_) => "backend_failure",
        }
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(e: anyhow::Error) -> Self {
        Self::Backend(BackendError::Storage(e))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_surface_as_backend_failures() {
        let err: WorkflowError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.kind(), "backend_failure");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn guard_violation_names_the_interns() {
        let err = WorkflowError::GuardViolation {
            project_id: 1,
            intern_ids: vec![7],
        };
        assert_eq!(err.kind(), "guard_violation");
        assert!(err.to_string().contains("[7]"));
    }
}

use crate::backend::Backend;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::*;

/// Append-only audit log keyed by project.
pub struct HistoryLog<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> HistoryLog<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Append an entry to an existing project's history.
    pub async fn append(&self, project_id: DbId, event: HistoryEvent) -> WorkflowResult<HistoryItem> {
        if let HistoryEvent::Note { message } = &event {
            if message.trim().is_empty() {
                return Err(WorkflowError::validation("history note must not be blank"));
            }
        }
        self.require_project(project_id).await?;
        self.record(project_id, event).await
    }

    /// Entries for a project in insertion order.
    pub async fn list(&self, project_id: DbId) -> WorkflowResult<Vec<HistoryItem>> {
        self.require_project(project_id).await?;
        Ok(self.backend.list_history(project_id).await?)
    }

    /// Append without re-checking the project, for callers that already loaded it.
    pub(crate) async fn record(
        &self,
        project_id: DbId,
        event: HistoryEvent,
    ) -> WorkflowResult<HistoryItem> {
        tracing::debug!(project_id, action = event.action(), "Recording history entry");
        Ok(self.backend.append_history(project_id, event).await?)
    }

    async fn require_project(&self, project_id: DbId) -> WorkflowResult<Project> {
        self.backend
            .get_project(project_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))
    }
}

use crate::backend::Backend;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::*;

use super::history::HistoryLog;

/// Enforces the one-way project status lattice `in_progress → completed`.
pub struct StatusEngine<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> StatusEngine<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Operator-requested status change.
    ///
    /// Setting the current status again is a no-op that records nothing.
    pub async fn set_status(&self, project_id: DbId, status: ProjectStatus) -> WorkflowResult<Project> {
        let project = self
            .backend
            .get_project(project_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))?;

        let (project, _) = self.apply(project, status, false).await?;
        Ok(project)
    }

    /// Completion triggered by the watcher. Recorded as automatic.
    ///
    /// Returns `None` if another writer completed the project first, in which
    /// case nothing is recorded.
    pub(crate) async fn complete_automatically(&self, project: Project) -> WorkflowResult<Option<Project>> {
        let (project, changed) = self.apply(project, ProjectStatus::Completed, true).await?;
        Ok(changed.then_some(project))
    }

    /// Returns the project as stored afterwards and whether this call moved it.
    async fn apply(
        &self,
        mut project: Project,
        status: ProjectStatus,
        automatic: bool,
    ) -> WorkflowResult<(Project, bool)> {
        check_transition(&project, status)?;
        if project.status == status {
            return Ok((project, false));
        }

        let moved = self
            .backend
            .update_project_status(project.id, project.status, status)
            .await?;
        if !moved {
            let current = self
                .backend
                .get_project(project.id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("project", project.id))?;
            tracing::debug!(
                project_id = current.id,
                status = current.status.as_str(),
                "Project status changed concurrently"
            );
            check_transition(&current, status)?;
            return Ok((current, false));
        }

        HistoryLog::new(self.backend)
            .record(project.id, HistoryEvent::StatusChanged { status, automatic })
            .await?;

        tracing::info!(
            project_id = project.id,
            status = status.as_str(),
            automatic,
            "Project status changed"
        );

        project.status = status;
        project.updated_at = chrono::Utc::now();
        Ok((project, true))
    }
}

fn check_transition(project: &Project, status: ProjectStatus) -> WorkflowResult<()> {
    if project.status.can_transition_to(status) {
        return Ok(());
    }
    tracing::warn!(
        project_id = project.id,
        from = project.status.as_str(),
        to = status.as_str(),
        "Rejected project status regression"
    );
    Err(WorkflowError::project_regression(project.status, status))
}

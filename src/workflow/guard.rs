use crate::backend::Backend;
use crate::error::WorkflowResult;
use crate::models::*;

/// Decides whether interns may be removed from a project.
///
/// An intern may leave a project when they have no task in it, or when every
/// one of their tasks in it is completed. The check always reads tasks fresh
/// from the backend.
pub struct UnassignmentGuard<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> UnassignmentGuard<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub async fn can_unassign(&self, project_id: DbId, intern_id: DbId) -> WorkflowResult<bool> {
        let tasks = self.backend.list_tasks_by_project(project_id).await?;
        Ok(intern_can_leave(&tasks, intern_id))
    }

    /// The subset of `intern_ids` that may not leave, in input order.
    pub async fn blocked(&self, project_id: DbId, intern_ids: &[DbId]) -> WorkflowResult<Vec<DbId>> {
        let tasks = self.backend.list_tasks_by_project(project_id).await?;
        Ok(intern_ids
            .iter()
            .copied()
            .filter(|&id| !intern_can_leave(&tasks, id))
            .collect())
    }
}

/// Whether `intern_id` has no open task among `project_tasks`.
pub fn intern_can_leave(project_tasks: &[Task], intern_id: DbId) -> bool {
    project_tasks
        .iter()
        .filter(|t| t.intern_id == intern_id)
        .all(Task::is_completed)
}

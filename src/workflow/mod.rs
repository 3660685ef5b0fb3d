//! The assignment and completion workflow.
//!
//! - [`AssignmentStore`]: project → interns membership, bulk assign/unassign.
//! - [`StatusEngine`]: one-way project status (`in_progress` → `completed`).
//! - [`UnassignmentGuard`]: blocks removing interns who still have open tasks.
//! - [`HistoryLog`]: append-only audit trail per project.
//! - [`CompletionWatcher`]: completes projects whose tasks are all done and
//!   releases their interns.
//!
//! [`Workflow`] wires these over a [`Backend`] and adds the surrounding
//! intern, project and task operations. Every task status change runs a
//! completion pass before returning.

mod assignment;
mod guard;
mod history;
mod reconciler;
mod status;
mod watcher;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub use assignment::{busy_elsewhere, busy_interns, AssignmentStore};
pub use guard::{intern_can_leave, UnassignmentGuard};
pub use history::HistoryLog;
pub use reconciler::Reconciler;
pub use status::StatusEngine;
pub use watcher::{
    projects_due_for_completion, CompletedProject, CompletionWatcher, ReconcileFailure,
    ReconcileReport,
};

use crate::backend::Backend;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::*;

/// Result of a task status change, including the completion pass it triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub task: Task,
    pub reconcile: ReconcileReport,
}

pub struct Workflow<B> {
    backend: Arc<B>,
    /// Held for the whole of a completion pass; clones share it.
    reconcile_lock: Arc<Mutex<()>>,
}

impl<B> Clone for Workflow<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            reconcile_lock: self.reconcile_lock.clone(),
        }
    }
}

impl<B: Backend> Workflow<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            reconcile_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn assignments(&self) -> AssignmentStore<'_, B> {
        AssignmentStore::new(&*self.backend)
    }

    pub fn status(&self) -> StatusEngine<'_, B> {
        StatusEngine::new(&*self.backend)
    }

    pub fn guard(&self) -> UnassignmentGuard<'_, B> {
        UnassignmentGuard::new(&*self.backend)
    }

    pub fn history(&self) -> HistoryLog<'_, B> {
        HistoryLog::new(&*self.backend)
    }

    /// Direct access to the watcher. Passes run this way are not serialized
    /// with [`Workflow::reconcile`].
    pub fn watcher(&self) -> CompletionWatcher<'_, B> {
        CompletionWatcher::new(&*self.backend)
    }

    // ============================================================
    // Projects
    // ============================================================

    pub async fn create_project(&self, name: &str) -> WorkflowResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::validation("project name is required"));
        }
        let project = self.backend.create_project(name.to_string()).await?;
        tracing::info!(project_id = project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub async fn list_projects(&self) -> WorkflowResult<Vec<Project>> {
        Ok(self.backend.list_projects().await?)
    }

    pub async fn get_project(&self, id: DbId) -> WorkflowResult<Project> {
        self.backend
            .get_project(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", id))
    }

    pub async fn set_project_status(&self, id: DbId, status: ProjectStatus) -> WorkflowResult<Project> {
        self.status().set_status(id, status).await
    }

    pub async fn assign(&self, project_id: DbId, intern_ids: &[DbId]) -> WorkflowResult<Vec<DbId>> {
        self.assignments().assign(project_id, intern_ids).await
    }

    pub async fn unassign(&self, project_id: DbId, intern_ids: &[DbId]) -> WorkflowResult<Vec<DbId>> {
        self.assignments().unassign(project_id, intern_ids).await
    }

    pub async fn can_unassign(&self, project_id: DbId, intern_id: DbId) -> WorkflowResult<bool> {
        self.get_project(project_id).await?;
        self.get_intern(intern_id).await?;
        self.guard().can_unassign(project_id, intern_id).await
    }

    pub async fn assigned_interns(&self, project_id: DbId) -> WorkflowResult<BTreeSet<DbId>> {
        self.assignments().get_assigned(project_id).await
    }

    pub async fn all_assignments(&self) -> WorkflowResult<AssignedInternsMap> {
        self.assignments().get_all_assigned().await
    }

    pub async fn project_history(&self, project_id: DbId) -> WorkflowResult<Vec<HistoryItem>> {
        self.history().list(project_id).await
    }

    pub async fn add_history_note(&self, project_id: DbId, message: &str) -> WorkflowResult<HistoryItem> {
        self.history()
            .append(
                project_id,
                HistoryEvent::Note {
                    message: message.trim().to_string(),
                },
            )
            .await
    }

    // ============================================================
    // Interns
    // ============================================================

    pub async fn create_intern(&self, mut input: CreateInternInput) -> WorkflowResult<Intern> {
        input.name = input.name.trim().to_string();
        input.email = input.email.trim().to_lowercase();
        input.bio = input.bio.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        input.linkedin = input
            .linkedin
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if input.name.is_empty() {
            return Err(WorkflowError::validation("intern name is required"));
        }
        if !is_plausible_email(&input.email) {
            return Err(WorkflowError::validation(format!(
                "'{}' is not a valid email address",
                input.email
            )));
        }
        if self.backend.find_intern_by_email(&input.email).await?.is_some() {
            return Err(WorkflowError::validation(format!(
                "an intern with email '{}' already exists",
                input.email
            )));
        }

        let intern = self.backend.create_intern(input).await?;
        tracing::info!(intern_id = intern.id, "Intern registered");
        Ok(intern)
    }

    pub async fn list_interns(&self) -> WorkflowResult<Vec<Intern>> {
        Ok(self.backend.list_interns().await?)
    }

    pub async fn get_intern(&self, id: DbId) -> WorkflowResult<Intern> {
        self.backend
            .get_intern(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("intern", id))
    }

    /// Interns not assigned to any in-progress project.
    pub async fn available_interns(&self) -> WorkflowResult<Vec<Intern>> {
        let projects = self.backend.list_projects().await?;
        let assignments = self.backend.list_all_assignments().await?;
        let busy = busy_interns(&projects, &assignments);

        Ok(self
            .backend
            .list_interns()
            .await?
            .into_iter()
            .filter(|i| !busy.contains(&i.id))
            .collect())
    }

    /// The in-progress project an intern is working on, if any.
    pub async fn current_project(&self, intern_id: DbId) -> WorkflowResult<Option<Project>> {
        self.get_intern(intern_id).await?;
        Ok(self
            .backend
            .list_projects_for_intern(intern_id)
            .await?
            .into_iter()
            .find(|p| p.status == ProjectStatus::InProgress))
    }

    // ============================================================
    // Tasks
    // ============================================================

    pub async fn create_task(&self, intern_id: DbId, mut input: CreateTaskInput) -> WorkflowResult<Task> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(WorkflowError::validation("task title is required"));
        }

        self.get_intern(intern_id).await?;
        let project = self.get_project(input.project_id).await?;
        if project.status == ProjectStatus::Completed {
            return Err(WorkflowError::validation(format!(
                "project '{}' is completed and cannot take new tasks",
                project.name
            )));
        }

        let task_date = input.task_date.unwrap_or_else(|| Utc::now().date_naive());
        if input.deadline.is_some_and(|d| d < task_date) {
            return Err(WorkflowError::validation("deadline must not be before the task date"));
        }
        input.task_date = Some(task_date);

        let task = self.backend.create_task(intern_id, input).await?;
        tracing::info!(task_id = task.id, project_id = task.project_id, intern_id, "Task created");
        Ok(task)
    }

    pub async fn list_tasks(&self) -> WorkflowResult<Vec<Task>> {
        Ok(self.backend.list_tasks().await?)
    }

    pub async fn tasks_for_project(&self, project_id: DbId) -> WorkflowResult<Vec<Task>> {
        self.get_project(project_id).await?;
        Ok(self.backend.list_tasks_by_project(project_id).await?)
    }

    pub async fn tasks_for_intern(&self, intern_id: DbId) -> WorkflowResult<Vec<Task>> {
        self.get_intern(intern_id).await?;
        Ok(self.backend.list_tasks_by_intern(intern_id).await?)
    }

    /// Move a task to a new status, then run a completion pass.
    ///
    /// Completed tasks are frozen. Re-applying the current status writes
    /// nothing but still reconciles. Once the task is written the call
    /// succeeds; a pass that cannot run is reported under `failures` against
    /// the task's project.
    pub async fn update_task_status(&self, task_id: DbId, status: TaskStatus) -> WorkflowResult<TaskStatusUpdate> {
        let mut task = self
            .backend
            .get_task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("task", task_id))?;

        if task.is_completed() && status != TaskStatus::Completed {
            tracing::warn!(task_id, to = status.as_str(), "Rejected change to completed task");
            return Err(WorkflowError::IllegalTransition {
                from: "task status 'completed'".to_string(),
                to: format!("'{}'", status.as_str()),
            });
        }

        if task.status != status {
            self.backend.update_task_status(task_id, status).await?;
            tracing::info!(task_id, status = status.as_str(), "Task status updated");
            task.status = status;
        }

        let reconcile = match self.reconcile().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(task_id, error = %e, "Completion pass after task update failed");
                ReconcileReport {
                    completed: Vec::new(),
                    failures: vec![ReconcileFailure {
                        project_id: task.project_id,
                        error: e.to_string(),
                    }],
                }
            }
        };
        Ok(TaskStatusUpdate { task, reconcile })
    }

    /// Run one completion pass. Passes from every clone of this workflow run
    /// one at a time.
    pub async fn reconcile(&self) -> WorkflowResult<ReconcileReport> {
        let _pass = self.reconcile_lock.lock().await;
        self.watcher().reconcile().await
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_check_rejects_obvious_garbage() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
        assert!(!is_plausible_email("ada@example."));
    }
}

//! Data-access interface consumed by the workflow core.
//!
//! Every operation may suspend. Implementations are the single source of
//! truth: the core never caches what it reads, so each workflow step re-queries
//! the aggregates it depends on.

use async_trait::async_trait;

use crate::db::Database;
use crate::error::BackendError;
use crate::models::*;

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    // Projects
    async fn list_projects(&self) -> BackendResult<Vec<Project>>;
    async fn get_project(&self, id: DbId) -> BackendResult<Option<Project>>;
    /// New projects start in progress.
    async fn create_project(&self, name: String) -> BackendResult<Project>;
    /// Move a project from `from` to `to`. Returns `false`, writing nothing,
    /// if the project is missing or no longer in `from`.
    async fn update_project_status(
        &self,
        id: DbId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> BackendResult<bool>;

    // Interns
    async fn list_interns(&self) -> BackendResult<Vec<Intern>>;
    async fn get_intern(&self, id: DbId) -> BackendResult<Option<Intern>>;
    async fn find_intern_by_email(&self, email: &str) -> BackendResult<Option<Intern>>;
    async fn create_intern(&self, input: CreateInternInput) -> BackendResult<Intern>;

    // Assignments
    async fn list_assigned_interns(&self, project_id: DbId) -> BackendResult<Vec<DbId>>;
    async fn list_all_assignments(&self) -> BackendResult<AssignedInternsMap>;
    async fn list_projects_for_intern(&self, intern_id: DbId) -> BackendResult<Vec<Project>>;
    /// Add interns not yet on the project and record an `assigned` entry for
    /// each, atomically. Returns the ids actually added.
    async fn assign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> BackendResult<Vec<DbId>>;
    /// Remove interns that are on the project and record an `unassigned`
    /// entry for each, atomically. Returns the ids actually removed.
    async fn unassign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> BackendResult<Vec<DbId>>;

    // History
    async fn append_history(
        &self,
        project_id: DbId,
        event: HistoryEvent,
    ) -> BackendResult<HistoryItem>;
    async fn list_history(&self, project_id: DbId) -> BackendResult<Vec<HistoryItem>>;

    // Tasks
    async fn list_tasks(&self) -> BackendResult<Vec<Task>>;
    async fn list_tasks_by_intern(&self, intern_id: DbId) -> BackendResult<Vec<Task>>;
    async fn list_tasks_by_project(&self, project_id: DbId) -> BackendResult<Vec<Task>>;
    async fn get_task(&self, id: DbId) -> BackendResult<Option<Task>>;
    async fn create_task(&self, intern_id: DbId, input: CreateTaskInput) -> BackendResult<Task>;
    async fn update_task_status(&self, id: DbId, status: TaskStatus) -> BackendResult<()>;
}

#[async_trait]
impl Backend for Database {
    async fn list_projects(&self) -> BackendResult<Vec<Project>> {
        Ok(self.get_all_projects()?)
    }

    async fn get_project(&self, id: DbId) -> BackendResult<Option<Project>> {
        Ok(Database::get_project(self, id)?)
    }

    async fn create_project(&self, name: String) -> BackendResult<Project> {
        Ok(Database::create_project(self, CreateProjectInput { name })?)
    }

    async fn update_project_status(
        &self,
        id: DbId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> BackendResult<bool> {
        Ok(Database::update_project_status(self, id, from, to)?)
    }

    async fn list_interns(&self) -> BackendResult<Vec<Intern>> {
        Ok(self.get_all_interns()?)
    }

    async fn get_intern(&self, id: DbId) -> BackendResult<Option<Intern>> {
        Ok(Database::get_intern(self, id)?)
    }

    async fn find_intern_by_email(&self, email: &str) -> BackendResult<Option<Intern>> {
        Ok(self.get_intern_by_email(email)?)
    }

    async fn create_intern(&self, input: CreateInternInput) -> BackendResult<Intern> {
        Ok(Database::create_intern(self, input)?)
    }

    async fn list_assigned_interns(&self, project_id: DbId) -> BackendResult<Vec<DbId>> {
        Ok(self.get_assigned_interns(project_id)?)
    }

    async fn list_all_assignments(&self) -> BackendResult<AssignedInternsMap> {
        Ok(self.get_all_assignments()?)
    }

    async fn list_projects_for_intern(&self, intern_id: DbId) -> BackendResult<Vec<Project>> {
        Ok(self.get_projects_for_intern(intern_id)?)
    }

    async fn assign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> BackendResult<Vec<DbId>> {
        Ok(Database::assign_interns(self, project_id, intern_ids)?)
    }

    async fn unassign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> BackendResult<Vec<DbId>> {
        Ok(Database::unassign_interns(self, project_id, intern_ids)?)
    }

    async fn append_history(
        &self,
        project_id: DbId,
        event: HistoryEvent,
    ) -> BackendResult<HistoryItem> {
        Ok(Database::append_history(self, project_id, event)?)
    }

    async fn list_history(&self, project_id: DbId) -> BackendResult<Vec<HistoryItem>> {
        Ok(self.get_project_history(project_id)?)
    }

    async fn list_tasks(&self) -> BackendResult<Vec<Task>> {
        Ok(self.get_all_tasks()?)
    }

    async fn list_tasks_by_intern(&self, intern_id: DbId) -> BackendResult<Vec<Task>> {
        Ok(self.get_tasks_by_intern(intern_id)?)
    }

    async fn list_tasks_by_project(&self, project_id: DbId) -> BackendResult<Vec<Task>> {
        Ok(self.get_tasks_by_project(project_id)?)
    }

    async fn get_task(&self, id: DbId) -> BackendResult<Option<Task>> {
        Ok(Database::get_task(self, id)?)
    }

    async fn create_task(&self, intern_id: DbId, input: CreateTaskInput) -> BackendResult<Task> {
        Ok(Database::create_task(self, intern_id, input)?)
    }

    async fn update_task_status(&self, id: DbId, status: TaskStatus) -> BackendResult<()> {
        if Database::update_task_status(self, id, status)? {
            Ok(())
        } else {
            Err(anyhow::anyhow!("task {} disappeared during status update", id).into())
        }
    }
}

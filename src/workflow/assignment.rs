use std::collections::{BTreeSet, HashSet};

use crate::backend::Backend;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::*;

use super::guard::UnassignmentGuard;

/// Project → interns membership with bulk assign and unassign.
pub struct AssignmentStore<'a, B> {
    backend: &'a B,
}

impl<'a, B: Backend> AssignmentStore<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub async fn get_assigned(&self, project_id: DbId) -> WorkflowResult<BTreeSet<DbId>> {
        self.require_project(project_id).await?;
        let ids = self.backend.list_assigned_interns(project_id).await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn get_all_assigned(&self) -> WorkflowResult<AssignedInternsMap> {
        Ok(self.backend.list_all_assignments().await?)
    }

    /// Assign interns to an in-progress project.
    ///
    /// Interns already on the project are skipped. An intern assigned to a
    /// different in-progress project is rejected. Returns the newly assigned
    /// ids in request order; the backend records an `assigned` history entry
    /// for each in the same write.
    pub async fn assign(&self, project_id: DbId, intern_ids: &[DbId]) -> WorkflowResult<Vec<DbId>> {
        let intern_ids = dedup(intern_ids);
        if intern_ids.is_empty() {
            return Err(WorkflowError::validation("select at least one intern to assign"));
        }

        let project = self.require_project(project_id).await?;
        if project.status == ProjectStatus::Completed {
            return Err(WorkflowError::validation(format!(
                "project '{}' is completed and cannot take new interns",
                project.name
            )));
        }

        for &intern_id in &intern_ids {
            if self.backend.get_intern(intern_id).await?.is_none() {
                return Err(WorkflowError::not_found("intern", intern_id));
            }
        }

        let projects = self.backend.list_projects().await?;
        let assignments = self.backend.list_all_assignments().await?;
        let current: HashSet<DbId> = assignments
            .get(&project_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        for &intern_id in &intern_ids {
            if let Some(other) = busy_elsewhere(&projects, &assignments, intern_id, project_id) {
                tracing::warn!(intern_id, project_id, other = other.id, "Intern already busy");
                return Err(WorkflowError::validation(format!(
                    "intern {} is already assigned to in-progress project '{}'",
                    intern_id, other.name
                )));
            }
        }

        let candidates: Vec<DbId> = intern_ids
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let added = self.backend.assign_interns(project_id, &candidates).await?;
        tracing::info!(project_id, interns = ?added, "Interns assigned");
        Ok(added)
    }

    /// Remove interns from a project, all or nothing.
    ///
    /// Every intern must pass the [`UnassignmentGuard`]; if any fails, nothing
    /// changes and the call returns [`WorkflowError::GuardViolation`] naming
    /// the blocked interns. Interns not currently assigned are skipped.
    pub async fn unassign(&self, project_id: DbId, intern_ids: &[DbId]) -> WorkflowResult<Vec<DbId>> {
        let intern_ids = dedup(intern_ids);
        if intern_ids.is_empty() {
            return Err(WorkflowError::validation("select at least one intern to unassign"));
        }
        self.require_project(project_id).await?;

        let blocked = UnassignmentGuard::new(self.backend)
            .blocked(project_id, &intern_ids)
            .await?;
        if !blocked.is_empty() {
            tracing::warn!(project_id, interns = ?blocked, "Unassignment blocked by open tasks");
            return Err(WorkflowError::GuardViolation {
                project_id,
                intern_ids: blocked,
            });
        }

        let current: HashSet<DbId> = self
            .backend
            .list_assigned_interns(project_id)
            .await?
            .into_iter()
            .collect();
        let removed: Vec<DbId> = intern_ids
            .into_iter()
            .filter(|id| current.contains(id))
            .collect();

        self.remove(project_id, removed).await
    }

    /// Unassign everyone from a project without consulting the guard.
    ///
    /// Only the completion watcher calls this, after it has established that
    /// every task in the project is completed. The guard is bypassed
    /// explicitly so a future change to the completeness rule cannot be
    /// masked by guard behaviour.
    pub(crate) async fn release_all(&self, project_id: DbId) -> WorkflowResult<Vec<DbId>> {
        let assigned = self.backend.list_assigned_interns(project_id).await?;
        self.remove(project_id, assigned).await
    }

    /// Returns only the interns the backend actually removed.
    async fn remove(&self, project_id: DbId, intern_ids: Vec<DbId>) -> WorkflowResult<Vec<DbId>> {
        if intern_ids.is_empty() {
            return Ok(intern_ids);
        }

        let removed = self.backend.unassign_interns(project_id, &intern_ids).await?;
        if !removed.is_empty() {
            tracing::info!(project_id, interns = ?removed, "Interns unassigned");
        }
        Ok(removed)
    }

    async fn require_project(&self, project_id: DbId) -> WorkflowResult<Project> {
        self.backend
            .get_project(project_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))
    }
}

/// The in-progress project, other than `project_id`, that holds `intern_id`.
pub fn busy_elsewhere<'p>(
    projects: &'p [Project],
    assignments: &AssignedInternsMap,
    intern_id: DbId,
    project_id: DbId,
) -> Option<&'p Project> {
    projects.iter().find(|p| {
        p.id != project_id
            && p.status == ProjectStatus::InProgress
            && assignments
                .get(&p.id)
                .is_some_and(|ids| ids.contains(&intern_id))
    })
}

/// Interns on any in-progress project.
pub fn busy_interns(projects: &[Project], assignments: &AssignedInternsMap) -> HashSet<DbId> {
    projects
        .iter()
        .filter(|p| p.status == ProjectStatus::InProgress)
        .filter_map(|p| assignments.get(&p.id))
        .flatten()
        .copied()
        .collect()
}

fn dedup(ids: &[DbId]) -> Vec<DbId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::WorkflowResult;
use crate::models::*;

use super::assignment::AssignmentStore;
use super::history::HistoryLog;
use super::status::StatusEngine;

/// Level-triggered reconciliation of project completion from task state.
///
/// A project is fully complete when it has at least one task and every task
/// in it is completed. Each pass completes such projects and releases their
/// interns. Projects already marked completed are left alone, so running a
/// pass repeatedly is a no-op once the cascade has happened.
pub struct CompletionWatcher<'a, B> {
    backend: &'a B,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: Vec<CompletedProject>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.completed.is_empty() && self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedProject {
    pub project_id: DbId,
    /// Interns released by the cascade. Empty if nobody was assigned or the
    /// release step failed.
    pub released: Vec<DbId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub project_id: DbId,
    pub error: String,
}

impl<'a, B: Backend> CompletionWatcher<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Run one pass over every project.
    ///
    /// Only failing to load projects or tasks aborts the pass. Per-project
    /// failures are logged and collected in the report; a failed release never
    /// rolls back the completion that preceded it.
    pub async fn reconcile(&self) -> WorkflowResult<ReconcileReport> {
        let projects = self.backend.list_projects().await?;
        let tasks = self.backend.list_tasks().await?;
        let due = projects_due_for_completion(&projects, &tasks);

        tracing::debug!(
            projects = projects.len(),
            tasks = tasks.len(),
            due = due.len(),
            "Reconciling project completion"
        );

        let mut report = ReconcileReport::default();
        for project in projects.into_iter().filter(|p| due.contains(&p.id)) {
            let project_id = project.id;
            match self.cascade(project).await {
                Ok(Some(released)) => report.completed.push(CompletedProject {
                    project_id,
                    released,
                }),
                Ok(None) => {
                    tracing::debug!(project_id, "Project already completed elsewhere");
                }
                Err(Cascade::Completion(e)) => {
                    tracing::error!(project_id, error = %e, "Automatic completion failed");
                    report.failures.push(ReconcileFailure {
                        project_id,
                        error: e.to_string(),
                    });
                }
                Err(Cascade::Release(e)) => {
                    tracing::warn!(
                        project_id,
                        error = %e,
                        "Project completed but releasing interns failed"
                    );
                    report.completed.push(CompletedProject {
                        project_id,
                        released: Vec::new(),
                    });
                    report.failures.push(ReconcileFailure {
                        project_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// `Ok(None)` means another writer completed the project first and owns
    /// the rest of the cascade.
    async fn cascade(&self, project: Project) -> Result<Option<Vec<DbId>>, Cascade> {
        let history = HistoryLog::new(self.backend);
        let project_id = project.id;
        let name = project.name.clone();

        let completed = StatusEngine::new(self.backend)
            .complete_automatically(project)
            .await
            .map_err(Cascade::Completion)?;
        if completed.is_none() {
            return Ok(None);
        }
        history
            .record(
                project_id,
                HistoryEvent::Note {
                    message: "Project marked as completed: all tasks are done".to_string(),
                },
            )
            .await
            .map_err(Cascade::Release)?;

        let released = AssignmentStore::new(self.backend)
            .release_all(project_id)
            .await
            .map_err(Cascade::Release)?;

        if !released.is_empty() {
            history
                .record(
                    project_id,
                    HistoryEvent::Note {
                        message: format!(
                            "All interns unassigned from project '{}' due to completion",
                            name
                        ),
                    },
                )
                .await
                .map_err(Cascade::Release)?;
        }

        tracing::info!(project_id, released = ?released, "Project completed automatically");
        Ok(Some(released))
    }
}

/// Which step of the cascade failed. Failures after the status change do not
/// undo it.
enum Cascade {
    Completion(crate::error::WorkflowError),
    Release(crate::error::WorkflowError),
}

/// Ids of not-yet-completed projects whose tasks are all completed.
///
/// Projects without tasks never qualify.
pub fn projects_due_for_completion(projects: &[Project], tasks: &[Task]) -> Vec<DbId> {
    let mut by_project: HashMap<DbId, (usize, usize)> = HashMap::new();
    for task in tasks {
        let entry = by_project.entry(task.project_id).or_default();
        entry.0 += 1;
        if task.is_completed() {
            entry.1 += 1;
        }
    }

    projects
        .iter()
        .filter(|p| p.status != ProjectStatus::Completed)
        .filter(|p| {
            by_project
                .get(&p.id)
                .is_some_and(|&(total, done)| total > 0 && total == done)
        })
        .map(|p| p.id)
        .collect()
}

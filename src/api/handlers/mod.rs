use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::WorkflowError;
use crate::models::*;
use crate::workflow::{ReconcileReport, TaskStatusUpdate, Workflow};

pub type AppState = Workflow<Database>;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorBody>)>;

// ============================================================
// Error Handling
// ============================================================

/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `guard_violation`.
    pub error: String,
    pub message: String,
    /// Interns blocked by the unassignment guard.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intern_ids: Vec<DbId>,
}

/// Map a workflow error to a status code and body.
///
/// Backend failures are logged in full but reported to the client with a
/// generic message so internal details do not leak.
fn api_error(e: WorkflowError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::IllegalTransition { .. } | WorkflowError::GuardViolation { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Internal error: {}", e);
        "Internal server error".to_string()
    } else {
        tracing::warn!("Request rejected: {}", e);
        e.to_string()
    };

    let intern_ids = match &e {
        WorkflowError::GuardViolation { intern_ids, .. } => intern_ids.clone(),
        _ => Vec::new(),
    };

    (
        status,
        Json(ErrorBody {
            error: e.kind().to_string(),
            message,
            intern_ids,
        }),
    )
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(wf): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    wf.list_projects().await.map(Json).map_err(api_error)
}

pub async fn create_project(
    State(wf): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    wf.create_project(&input.name)
        .await
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(api_error)
}

pub async fn get_project(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
) -> ApiResult<Json<Project>> {
    wf.get_project(id).await.map(Json).map_err(api_error)
}

pub async fn update_project_status(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProjectStatusInput>,
) -> ApiResult<Json<Project>> {
    wf.set_project_status(id, input.status)
        .await
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Assignments
// ============================================================

pub async fn list_project_interns(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
) -> ApiResult<Json<BTreeSet<DbId>>> {
    wf.assigned_interns(id).await.map(Json).map_err(api_error)
}

pub async fn list_assignments(State(wf): State<AppState>) -> ApiResult<Json<AssignedInternsMap>> {
    wf.all_assignments().await.map(Json).map_err(api_error)
}

/// Response for assign and unassign: the interns whose membership changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentChange {
    pub project_id: DbId,
    pub intern_ids: Vec<DbId>,
}

pub async fn assign_interns(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<InternIdsInput>,
) -> ApiResult<Json<AssignmentChange>> {
    wf.assign(id, &input.intern_ids)
        .await
        .map(|intern_ids| {
            Json(AssignmentChange {
                project_id: id,
                intern_ids,
            })
        })
        .map_err(api_error)
}

pub async fn unassign_interns(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<InternIdsInput>,
) -> ApiResult<Json<AssignmentChange>> {
    wf.unassign(id, &input.intern_ids)
        .await
        .map(|intern_ids| {
            Json(AssignmentChange {
                project_id: id,
                intern_ids,
            })
        })
        .map_err(api_error)
}

pub async fn can_unassign(
    State(wf): State<AppState>,
    Path((project_id, intern_id)): Path<(DbId, DbId)>,
) -> ApiResult<Json<UnassignCheck>> {
    wf.can_unassign(project_id, intern_id)
        .await
        .map(|can_unassign| {
            Json(UnassignCheck {
                project_id,
                intern_id,
                can_unassign,
            })
        })
        .map_err(api_error)
}

// ============================================================
// History
// ============================================================

pub async fn get_project_history(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
) -> ApiResult<Json<Vec<HistoryItem>>> {
    wf.project_history(id).await.map(Json).map_err(api_error)
}

pub async fn add_history_note(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AppendNoteInput>,
) -> ApiResult<(StatusCode, Json<HistoryItem>)> {
    wf.add_history_note(id, &input.message)
        .await
        .map(|item| (StatusCode::CREATED, Json(item)))
        .map_err(api_error)
}

// ============================================================
// Interns
// ============================================================

pub async fn list_interns(State(wf): State<AppState>) -> ApiResult<Json<Vec<Intern>>> {
    wf.list_interns().await.map(Json).map_err(api_error)
}

pub async fn create_intern(
    State(wf): State<AppState>,
    Json(input): Json<CreateInternInput>,
) -> ApiResult<(StatusCode, Json<Intern>)> {
    wf.create_intern(input)
        .await
        .map(|i| (StatusCode::CREATED, Json(i)))
        .map_err(api_error)
}

pub async fn list_available_interns(State(wf): State<AppState>) -> ApiResult<Json<Vec<Intern>>> {
    wf.available_interns().await.map(Json).map_err(api_error)
}

pub async fn get_intern(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
) -> ApiResult<Json<Intern>> {
    wf.get_intern(id).await.map(Json).map_err(api_error)
}

pub async fn get_intern_project(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
) -> ApiResult<Json<Option<Project>>> {
    wf.current_project(id).await.map(Json).map_err(api_error)
}

// ============================================================
// Tasks
// ============================================================

/// Query parameters for listing tasks.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Only return tasks past their deadline that are not completed.
    #[serde(default)]
    pub overdue: bool,
}

fn filter_overdue(tasks: Vec<Task>, query: &ListTasksQuery) -> Vec<Task> {
    if !query.overdue {
        return tasks;
    }
    let today = Utc::now().date_naive();
    tasks.into_iter().filter(|t| t.is_overdue(today)).collect()
}

pub async fn list_tasks(
    State(wf): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    wf.list_tasks()
        .await
        .map(|tasks| Json(filter_overdue(tasks, &query)))
        .map_err(api_error)
}

pub async fn list_project_tasks(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    wf.tasks_for_project(id)
        .await
        .map(|tasks| Json(filter_overdue(tasks, &query)))
        .map_err(api_error)
}

pub async fn list_intern_tasks(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    wf.tasks_for_intern(id)
        .await
        .map(|tasks| Json(filter_overdue(tasks, &query)))
        .map_err(api_error)
}

pub async fn create_intern_task(
    State(wf): State<AppState>,
    Path(intern_id): Path<DbId>,
    Json(input): Json<CreateTaskInput>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    wf.create_task(intern_id, input)
        .await
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(api_error)
}

pub async fn update_task_status(
    State(wf): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateTaskStatusInput>,
) -> ApiResult<Json<TaskStatusUpdate>> {
    wf.update_task_status(id, input.status)
        .await
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Reconciliation
// ============================================================

pub async fn reconcile(State(wf): State<AppState>) -> ApiResult<Json<ReconcileReport>> {
    wf.reconcile().await.map(Json).map_err(api_error)
}

//! HTTP client for the Cohort API.
//!
//! Reads are cached per request path and tagged; every mutation evicts the
//! tags it can affect (see [`invalidates`]), so a read after a write always
//! reaches the server. Configuration via environment variables:
//! - `COHORT_URL` - Base URL (default: `http://127.0.0.1:3000/api/v1`)
//! - `COHORT_API_KEY` - API key for authentication (optional for local)

mod cache;

use std::collections::BTreeSet;

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use cache::{invalidates, Tag, TagCache};

use crate::api::{AssignmentChange, ErrorBody};
use crate::models::*;
use crate::workflow::{ReconcileReport, TaskStatusUpdate};

/// Default URL for local development.
const DEFAULT_URL: &str = "http://127.0.0.1:3000/api/v1";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Illegal transition or guard violation. `kind` is the server's error kind.
    #[error("Conflict ({kind}): {message}")]
    Conflict {
        kind: String,
        message: String,
        intern_ids: Vec<DbId>,
    },

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),
}

impl ClientError {
    /// True when the server refused an unassignment because of open tasks.
    pub fn is_guard_violation(&self) -> bool {
        matches!(self, ClientError::Conflict { kind, .. } if kind == "guard_violation")
    }
}

/// HTTP client for the Cohort API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    cache: TagCache,
}

impl ApiClient {
    /// Create client from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("COHORT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let api_key = std::env::var("COHORT_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(base_url, api_key)
    }

    /// Create with explicit configuration.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
            cache: TagCache::new(),
        }
    }

    pub fn cache(&self) -> &TagCache {
        &self.cache
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let message = body
            .as_ref()
            .map(|b| b.message.clone())
            .unwrap_or_else(|| text.clone());

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::BAD_REQUEST => ClientError::BadRequest(message),
            StatusCode::CONFLICT => {
                let (kind, intern_ids) = body
                    .map(|b| (b.error, b.intern_ids))
                    .unwrap_or_else(|| ("conflict".to_string(), Vec::new()));
                ClientError::Conflict {
                    kind,
                    message,
                    intern_ids,
                }
            }
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
            _ => ClientError::Server(format!("{}: {}", status, message)),
        })
    }

    /// GET through the cache.
    async fn query<T: DeserializeOwned>(&self, tag: Tag, path: &str) -> Result<T, ClientError> {
        if let Some(hit) = self.cache.get(path) {
            tracing::trace!(path, "Client cache hit");
            return Ok(serde_json::from_value(hit)?);
        }

        let generation = self.cache.generation(tag);
        let response = self.request(Method::GET, path).send().await?;
        let value: serde_json::Value = self.handle_response(response).await?;
        if !self.cache.insert_if_current(tag, path, value.clone(), generation) {
            tracing::debug!(path, "Discarding response invalidated while in flight");
        }
        Ok(serde_json::from_value(value)?)
    }

    /// GET bypassing the cache, for reads no single tag covers.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.request(Method::GET, path).send().await?;
        self.handle_response(response).await
    }

    /// Send a write and evict `tags` once the server accepted it.
    async fn mutate<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        tags: &[Tag],
    ) -> Result<T, ClientError> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        let result = self.handle_response(req.send().await?).await;
        if result.is_ok() {
            self.cache.invalidate(tags);
        }
        result
    }

    // ============================================================
    // Health
    // ============================================================

    /// Check that the server is up.
    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self.request(Method::GET, "/health").send().await?;
        self.handle_response::<serde_json::Value>(response)
            .await
            .map(|_| ())
    }

    // ============================================================
    // Projects
    // ============================================================

    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.query(Tag::Projects, "/projects").await
    }

    pub async fn get_project(&self, id: DbId) -> Result<Project, ClientError> {
        self.query(Tag::Projects, &format!("/projects/{}", id)).await
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, ClientError> {
        let input = CreateProjectInput {
            name: name.to_string(),
        };
        self.mutate(
            Method::POST,
            "/projects",
            Some(&input),
            invalidates::CREATE_PROJECT,
        )
        .await
    }

    pub async fn set_project_status(
        &self,
        id: DbId,
        status: ProjectStatus,
    ) -> Result<Project, ClientError> {
        self.mutate(
            Method::PUT,
            &format!("/projects/{}/status", id),
            Some(&UpdateProjectStatusInput { status }),
            invalidates::SET_STATUS,
        )
        .await
    }

    // ============================================================
    // Assignments
    // ============================================================

    pub async fn assigned_interns(&self, project_id: DbId) -> Result<BTreeSet<DbId>, ClientError> {
        self.query(Tag::Assignments, &format!("/projects/{}/interns", project_id))
            .await
    }

    pub async fn all_assignments(&self) -> Result<AssignedInternsMap, ClientError> {
        self.query(Tag::Assignments, "/assignments").await
    }

    pub async fn assign(
        &self,
        project_id: DbId,
        intern_ids: &[DbId],
    ) -> Result<AssignmentChange, ClientError> {
        let input = InternIdsInput {
            intern_ids: intern_ids.to_vec(),
        };
        self.mutate(
            Method::POST,
            &format!("/projects/{}/assign", project_id),
            Some(&input),
            invalidates::ASSIGN,
        )
        .await
    }

    pub async fn unassign(
        &self,
        project_id: DbId,
        intern_ids: &[DbId],
    ) -> Result<AssignmentChange, ClientError> {
        let input = InternIdsInput {
            intern_ids: intern_ids.to_vec(),
        };
        self.mutate(
            Method::POST,
            &format!("/projects/{}/unassign", project_id),
            Some(&input),
            invalidates::UNASSIGN,
        )
        .await
    }

    /// Guard check. Not cached: the answer depends on task state.
    pub async fn can_unassign(
        &self,
        project_id: DbId,
        intern_id: DbId,
    ) -> Result<bool, ClientError> {
        let check: UnassignCheck = self
            .fetch(&format!(
                "/projects/{}/interns/{}/can-unassign",
                project_id, intern_id
            ))
            .await?;
        Ok(check.can_unassign)
    }

    // ============================================================
    // History
    // ============================================================

    pub async fn project_history(&self, project_id: DbId) -> Result<Vec<HistoryItem>, ClientError> {
        self.query(Tag::History, &format!("/projects/{}/history", project_id))
            .await
    }

    pub async fn add_history_note(
        &self,
        project_id: DbId,
        message: &str,
    ) -> Result<HistoryItem, ClientError> {
        let input = AppendNoteInput {
            message: message.to_string(),
        };
        self.mutate(
            Method::POST,
            &format!("/projects/{}/history", project_id),
            Some(&input),
            invalidates::APPEND_NOTE,
        )
        .await
    }

    // ============================================================
    // Interns
    // ============================================================

    pub async fn list_interns(&self) -> Result<Vec<Intern>, ClientError> {
        self.query(Tag::Interns, "/interns").await
    }

    /// Not cached: depends on interns, assignments and project status.
    pub async fn available_interns(&self) -> Result<Vec<Intern>, ClientError> {
        self.fetch("/interns/available").await
    }

    pub async fn get_intern(&self, id: DbId) -> Result<Intern, ClientError> {
        self.query(Tag::Interns, &format!("/interns/{}", id)).await
    }

    pub async fn current_project(&self, intern_id: DbId) -> Result<Option<Project>, ClientError> {
        self.fetch(&format!("/interns/{}/project", intern_id)).await
    }

    pub async fn create_intern(&self, input: &CreateInternInput) -> Result<Intern, ClientError> {
        self.mutate(
            Method::POST,
            "/interns",
            Some(input),
            invalidates::CREATE_INTERN,
        )
        .await
    }

    // ============================================================
    // Tasks
    // ============================================================

    pub async fn list_tasks(&self, overdue: bool) -> Result<Vec<Task>, ClientError> {
        let path = if overdue { "/tasks?overdue=true" } else { "/tasks" };
        self.query(Tag::Tasks, path).await
    }

    pub async fn tasks_for_project(&self, project_id: DbId) -> Result<Vec<Task>, ClientError> {
        self.query(Tag::Tasks, &format!("/projects/{}/tasks", project_id))
            .await
    }

    pub async fn tasks_for_intern(&self, intern_id: DbId) -> Result<Vec<Task>, ClientError> {
        self.query(Tag::Tasks, &format!("/interns/{}/tasks", intern_id))
            .await
    }

    pub async fn create_task(
        &self,
        intern_id: DbId,
        input: &CreateTaskInput,
    ) -> Result<Task, ClientError> {
        self.mutate(
            Method::POST,
            &format!("/interns/{}/tasks", intern_id),
            Some(input),
            invalidates::CREATE_TASK,
        )
        .await
    }

    pub async fn update_task_status(
        &self,
        task_id: DbId,
        status: TaskStatus,
    ) -> Result<TaskStatusUpdate, ClientError> {
        self.mutate(
            Method::PUT,
            &format!("/tasks/{}/status", task_id),
            Some(&UpdateTaskStatusInput { status }),
            invalidates::UPDATE_TASK_STATUS,
        )
        .await
    }

    /// Ask the server to run a completion pass now.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ClientError> {
        self.mutate(
            Method::POST,
            "/reconcile",
            None::<&()>,
            invalidates::RECONCILE,
        )
        .await
    }
}

pub mod handlers;
pub mod middleware;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;
use crate::workflow::Workflow;

pub use handlers::{AppState, AssignmentChange, ErrorBody};
pub use middleware::{RateLimiter, SecurityConfig};

/// Router with no authentication, rate limiting or origin restrictions.
pub fn create_router(db: Database) -> Router {
    create_router_with_security(Workflow::new(db), SecurityConfig::disabled())
}

pub fn create_router_with_security(workflow: AppState, security: SecurityConfig) -> Router {
    let mut api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}/status", put(handlers::update_project_status))
        .route("/projects/{id}/interns", get(handlers::list_project_interns))
        .route("/projects/{id}/assign", post(handlers::assign_interns))
        .route("/projects/{id}/unassign", post(handlers::unassign_interns))
        .route(
            "/projects/{id}/interns/{intern_id}/can-unassign",
            get(handlers::can_unassign),
        )
        .route(
            "/projects/{id}/history",
            get(handlers::get_project_history).post(handlers::add_history_note),
        )
        .route("/projects/{id}/tasks", get(handlers::list_project_tasks))
        .route("/assignments", get(handlers::list_assignments))
        // Interns
        .route(
            "/interns",
            get(handlers::list_interns).post(handlers::create_intern),
        )
        .route("/interns/available", get(handlers::list_available_interns))
        .route("/interns/{id}", get(handlers::get_intern))
        .route("/interns/{id}/project", get(handlers::get_intern_project))
        .route(
            "/interns/{id}/tasks",
            get(handlers::list_intern_tasks).post(handlers::create_intern_task),
        )
        // Tasks
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks/{id}/status", put(handlers::update_task_status))
        .route("/reconcile", post(handlers::reconcile))
        .route_layer(from_fn_with_state(
            security.clone(),
            middleware::auth_middleware,
        ));

    if let Some(limiter) = security.rate_limiter.clone() {
        api = api.route_layer(from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Health stays reachable without a key
    let api = api.route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(workflow)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::permissive(),
    }
}

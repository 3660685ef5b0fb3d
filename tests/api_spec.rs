use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::NaiveDate;
use cohort::api::{create_router, create_router_with_security, AssignmentChange, ErrorBody, SecurityConfig};
use cohort::db::Database;
use cohort::models::*;
use cohort::workflow::{ReconcileReport, TaskStatusUpdate, Workflow};
use serde_json::json;

fn test_db() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

fn setup() -> TestServer {
    TestServer::new(create_router(test_db())).expect("Failed to create test server")
}

async fn create_test_project(server: &TestServer, name: &str) -> Project {
    server
        .post("/api/v1/projects")
        .json(&CreateProjectInput {
            name: name.to_string(),
        })
        .await
        .json::<Project>()
}

async fn create_test_intern(server: &TestServer, name: &str) -> Intern {
    server
        .post("/api/v1/interns")
        .json(&CreateInternInput {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            joined_date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            bio: None,
            linkedin: None,
        })
        .await
        .json::<Intern>()
}

async fn create_test_task(server: &TestServer, project: &Project, intern: &Intern) -> Task {
    server
        .post(&format!("/api/v1/interns/{}/tasks", intern.id))
        .json(&json!({ "project_id": project.id, "title": "Write docs" }))
        .await
        .json::<Task>()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();

        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

mod projects {
    use super::*;

    #[tokio::test]
    async fn creates_and_lists_projects() {
        let server = setup();

        let response = server
            .post("/api/v1/projects")
            .json(&json!({ "name": "Alpha" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let project: Project = response.json();
        assert_eq!(project.status, ProjectStatus::InProgress);

        let projects: Vec<Project> = server.get("/api/v1/projects").await.json();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Alpha");
    }

    #[tokio::test]
    async fn rejects_blank_names_with_a_validation_error() {
        let server = setup();

        let response = server
            .post("/api/v1/projects")
            .json(&json!({ "name": "  " }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "validation_error");
    }

    #[tokio::test]
    async fn returns_404_for_missing_projects() {
        let server = setup();

        let response = server.get("/api/v1/projects/99").await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<ErrorBody>().error, "not_found");
    }

    #[tokio::test]
    async fn refuses_to_reopen_completed_projects() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let path = format!("/api/v1/projects/{}/status", project.id);

        server
            .put(&path)
            .json(&json!({ "status": "completed" }))
            .await
            .assert_status_ok();

        let response = server
            .put(&path)
            .json(&json!({ "status": "in_progress" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<ErrorBody>().error, "illegal_transition");
    }

    #[tokio::test]
    async fn accepts_the_dashed_in_progress_spelling() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;

        let response = server
            .put(&format!("/api/v1/projects/{}/status", project.id))
            .json(&json!({ "status": "in-progress" }))
            .await;

        response.assert_status_ok();
        let project: Project = response.json();
        assert_eq!(project.status, ProjectStatus::InProgress);

        let history: Vec<HistoryItem> = server
            .get(&format!("/api/v1/projects/{}/history", project.id))
            .await
            .json();
        assert!(history.is_empty());
    }
}

mod assignments {
    use super::*;

    #[tokio::test]
    async fn assigns_and_lists_interns() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let ada = create_test_intern(&server, "Ada").await;

        let change: AssignmentChange = server
            .post(&format!("/api/v1/projects/{}/assign", project.id))
            .json(&json!({ "intern_ids": [ada.id] }))
            .await
            .json();
        assert_eq!(change.intern_ids, vec![ada.id]);

        let assigned: Vec<DbId> = server
            .get(&format!("/api/v1/projects/{}/interns", project.id))
            .await
            .json();
        assert_eq!(assigned, vec![ada.id]);

        let all: AssignedInternsMap = server.get("/api/v1/assignments").await.json();
        assert_eq!(all.get(&project.id), Some(&vec![ada.id]));

        let available: Vec<Intern> = server.get("/api/v1/interns/available").await.json();
        assert!(available.is_empty());

        let current: Option<Project> = server
            .get(&format!("/api/v1/interns/{}/project", ada.id))
            .await
            .json();
        assert_eq!(current.map(|p| p.id), Some(project.id));
    }

    #[tokio::test]
    async fn rejects_empty_intern_lists() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;

        let response = server
            .post(&format!("/api/v1/projects/{}/assign", project.id))
            .json(&json!({ "intern_ids": [] }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn guard_violations_name_the_blocked_interns() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let ada = create_test_intern(&server, "Ada").await;
        server
            .post(&format!("/api/v1/projects/{}/assign", project.id))
            .json(&json!({ "intern_ids": [ada.id] }))
            .await;
        create_test_task(&server, &project, &ada).await;

        let check: UnassignCheck = server
            .get(&format!(
                "/api/v1/projects/{}/interns/{}/can-unassign",
                project.id, ada.id
            ))
            .await
            .json();
        assert!(!check.can_unassign);

        let response = server
            .post(&format!("/api/v1/projects/{}/unassign", project.id))
            .json(&json!({ "intern_ids": [ada.id] }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: ErrorBody = response.json();
        assert_eq!(body.error, "guard_violation");
        assert_eq!(body.intern_ids, vec![ada.id]);
    }
}

mod tasks {
    use super::*;

    #[tokio::test]
    async fn completing_the_last_task_completes_the_project() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let ada = create_test_intern(&server, "Ada").await;
        server
            .post(&format!("/api/v1/projects/{}/assign", project.id))
            .json(&json!({ "intern_ids": [ada.id] }))
            .await;
        let task = create_test_task(&server, &project, &ada).await;

        let response = server
            .put(&format!("/api/v1/tasks/{}/status", task.id))
            .json(&json!({ "status": "completed" }))
            .await;
        response.assert_status_ok();
        let update: TaskStatusUpdate = response.json();
        assert_eq!(update.task.status, TaskStatus::Completed);
        assert_eq!(update.reconcile.completed[0].project_id, project.id);

        let project: Project = server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await
            .json();
        assert_eq!(project.status, ProjectStatus::Completed);

        let history: Vec<HistoryItem> = server
            .get(&format!("/api/v1/projects/{}/history", project.id))
            .await
            .json();
        assert!(history.iter().any(|h| h.event.is_automatic()));
        assert_eq!(history.last().map(|h| h.event.action()), Some("note"));
    }

    #[tokio::test]
    async fn filters_overdue_tasks() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let ada = create_test_intern(&server, "Ada").await;
        let path = format!("/api/v1/interns/{}/tasks", ada.id);

        server
            .post(&path)
            .json(&json!({
                "project_id": project.id,
                "title": "Late",
                "task_date": "2020-01-01",
                "deadline": "2020-01-02"
            }))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post(&path)
            .json(&json!({ "project_id": project.id, "title": "No deadline" }))
            .await
            .assert_status(StatusCode::CREATED);

        let all: Vec<Task> = server.get("/api/v1/tasks").await.json();
        assert_eq!(all.len(), 2);

        let overdue: Vec<Task> = server.get("/api/v1/tasks?overdue=true").await.json();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].title, "Late");

        let by_project: Vec<Task> = server
            .get(&format!("/api/v1/projects/{}/tasks", project.id))
            .await
            .json();
        assert_eq!(by_project.len(), 2);
    }

    #[tokio::test]
    async fn reconcile_endpoint_reports_nothing_to_do() {
        let server = setup();
        create_test_project(&server, "Alpha").await;

        let report: ReconcileReport = server.post("/api/v1/reconcile").await.json();

        assert!(report.is_noop());
    }
}

mod history {
    use super::*;

    #[tokio::test]
    async fn appends_notes() {
        let server = setup();
        let project = create_test_project(&server, "Alpha").await;
        let path = format!("/api/v1/projects/{}/history", project.id);

        let response = server
            .post(&path)
            .json(&json!({ "message": "Kickoff meeting held" }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let history: Vec<HistoryItem> = server.get(&path).await.json();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event.message(), Some("Kickoff meeting held"));
    }
}

mod security {
    use super::*;

    fn secured(config: SecurityConfig) -> TestServer {
        let app = create_router_with_security(Workflow::new(test_db()), config);
        TestServer::new(app).expect("Failed to create test server")
    }

    #[tokio::test]
    async fn requires_the_api_key_except_for_health() {
        let server = secured(SecurityConfig::with_api_key("secret"));

        server.get("/api/v1/health").await.assert_status_ok();
        server
            .get("/api/v1/projects")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/projects")
            .authorization_bearer("wrong")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/projects")
            .authorization_bearer("secret")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn rate_limits_protected_routes() {
        let server = secured(SecurityConfig::with_rate_limit(2));

        server.get("/api/v1/projects").await.assert_status_ok();
        server.get("/api/v1/projects").await.assert_status_ok();
        server
            .get("/api/v1/projects")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn rotating_forwarded_headers_do_not_reset_the_limit() {
        let server = secured(SecurityConfig::with_rate_limit(2));

        for n in 1..=2 {
            server
                .get("/api/v1/projects")
                .add_header("X-Forwarded-For", format!("10.0.0.{}", n))
                .await
                .assert_status_ok();
        }
        server
            .get("/api/v1/projects")
            .add_header("X-Forwarded-For", "10.0.0.3")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }
}

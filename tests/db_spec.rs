use chrono::NaiveDate;
use cohort::db::Database;
use cohort::models::*;
use speculate2::speculate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn create_test_project(db: &Database, name: &str) -> Project {
    db.create_project(CreateProjectInput {
        name: name.to_string(),
    })
    .expect("Failed to create project")
}

fn create_test_intern(db: &Database, name: &str) -> Intern {
    db.create_intern(CreateInternInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        joined_date: date(2024, 1, 15),
        bio: None,
        linkedin: None,
    })
    .expect("Failed to create intern")
}

fn create_test_task(db: &Database, project: &Project, intern: &Intern, title: &str) -> Task {
    db.create_task(
        intern.id,
        CreateTaskInput {
            project_id: project.id,
            title: title.to_string(),
            description: String::new(),
            task_date: Some(date(2024, 2, 1)),
            deadline: Some(date(2024, 2, 10)),
        },
    )
    .expect("Failed to create task")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        it "starts new projects in progress" {
            let project = create_test_project(&db, "Onboarding");

            assert_eq!(project.name, "Onboarding");
            assert_eq!(project.status, ProjectStatus::InProgress);
        }

        it "returns None for a missing project" {
            assert!(db.get_project(999).expect("Query failed").is_none());
        }

        it "lists projects in creation order" {
            create_test_project(&db, "Zebra");
            create_test_project(&db, "Alpha");

            let names: Vec<String> = db
                .get_all_projects()
                .expect("Query failed")
                .into_iter()
                .map(|p| p.name)
                .collect();
            assert_eq!(names, vec!["Zebra", "Alpha"]);
        }

        it "persists status updates" {
            let project = create_test_project(&db, "Website");

            let updated = db
                .update_project_status(project.id, ProjectStatus::InProgress, ProjectStatus::Completed)
                .expect("Update failed");
            assert!(updated);

            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.status, ProjectStatus::Completed);
        }

        it "applies a status update only once" {
            let project = create_test_project(&db, "Website");

            let first = db
                .update_project_status(project.id, ProjectStatus::InProgress, ProjectStatus::Completed)
                .expect("Update failed");
            let second = db
                .update_project_status(project.id, ProjectStatus::InProgress, ProjectStatus::Completed)
                .expect("Update failed");
            assert!(first);
            assert!(!second);
        }

        it "reports false when updating a missing project" {
            let updated = db
                .update_project_status(42, ProjectStatus::InProgress, ProjectStatus::Completed)
                .expect("Update failed");
            assert!(!updated);
        }
    }

    describe "interns" {
        it "stores the profile only when given" {
            let plain = create_test_intern(&db, "Ada");
            assert!(plain.profile.is_none());

            let with_bio = db.create_intern(CreateInternInput {
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                joined_date: date(2024, 3, 1),
                bio: Some("Compilers".to_string()),
                linkedin: None,
            }).expect("Failed to create intern");

            let found = db.get_intern(with_bio.id).expect("Query failed").unwrap();
            let profile = found.profile.expect("profile should be stored");
            assert_eq!(profile.bio.as_deref(), Some("Compilers"));
            assert!(profile.linkedin.is_none());
        }

        it "finds interns by email" {
            let ada = create_test_intern(&db, "Ada");

            let found = db.get_intern_by_email("ada@example.com").expect("Query failed");
            assert_eq!(found.map(|i| i.id), Some(ada.id));
            assert!(db.get_intern_by_email("nobody@example.com").expect("Query failed").is_none());
        }

        it "rejects duplicate emails" {
            create_test_intern(&db, "Ada");

            let result = db.create_intern(CreateInternInput {
                name: "Other Ada".to_string(),
                email: "ada@example.com".to_string(),
                joined_date: date(2024, 1, 1),
                bio: None,
                linkedin: None,
            });
            assert!(result.is_err());
        }
    }

    describe "assignments" {
        it "returns only newly added interns" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");
            let grace = create_test_intern(&db, "Grace");

            let first = db.assign_interns(project.id, &[ada.id]).expect("Assign failed");
            assert_eq!(first, vec![ada.id]);

            let second = db
                .assign_interns(project.id, &[ada.id, grace.id])
                .expect("Assign failed");
            assert_eq!(second, vec![grace.id]);

            let assigned = db.get_assigned_interns(project.id).expect("Query failed");
            assert_eq!(assigned, vec![ada.id, grace.id]);
        }

        it "records history in the same write as membership changes" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");
            let grace = create_test_intern(&db, "Grace");

            db.assign_interns(project.id, &[ada.id, grace.id]).expect("Assign failed");
            db.assign_interns(project.id, &[ada.id]).expect("Assign failed");
            db.unassign_interns(project.id, &[grace.id]).expect("Unassign failed");
            db.unassign_interns(project.id, &[grace.id]).expect("Unassign failed");

            let history = db.get_project_history(project.id).expect("Query failed");
            let entries: Vec<(&str, Option<DbId>)> = history
                .iter()
                .map(|h| (h.event.action(), h.event.intern_id()))
                .collect();
            assert_eq!(
                entries,
                vec![
                    ("assigned", Some(ada.id)),
                    ("assigned", Some(grace.id)),
                    ("unassigned", Some(grace.id)),
                ]
            );
        }

        it "removes only interns that were assigned" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");
            let grace = create_test_intern(&db, "Grace");
            db.assign_interns(project.id, &[ada.id]).expect("Assign failed");

            let removed = db
                .unassign_interns(project.id, &[ada.id, grace.id])
                .expect("Unassign failed");
            assert_eq!(removed, vec![ada.id]);
            assert!(db.get_assigned_interns(project.id).expect("Query failed").is_empty());
        }

        it "groups every assignment by project" {
            let website = create_test_project(&db, "Website");
            let app = create_test_project(&db, "App");
            let ada = create_test_intern(&db, "Ada");
            let grace = create_test_intern(&db, "Grace");
            db.assign_interns(website.id, &[ada.id]).expect("Assign failed");
            db.assign_interns(app.id, &[grace.id, ada.id]).expect("Assign failed");

            let all = db.get_all_assignments().expect("Query failed");
            assert_eq!(all.get(&website.id), Some(&vec![ada.id]));
            assert_eq!(all.get(&app.id).map(|ids| ids.len()), Some(2));

            let projects = db.get_projects_for_intern(ada.id).expect("Query failed");
            assert_eq!(projects.len(), 2);
        }

        it "rolls back a batch that references a missing intern" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");

            let result = db.assign_interns(project.id, &[ada.id, 999]);
            assert!(result.is_err());
            assert!(db.get_assigned_interns(project.id).expect("Query failed").is_empty());
            assert!(db.get_project_history(project.id).expect("Query failed").is_empty());
        }
    }

    describe "tasks" {
        it "creates pending tasks with dates" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");

            let task = create_test_task(&db, &project, &ada, "Landing page");
            assert_eq!(task.status, TaskStatus::Pending);

            let found = db.get_task(task.id).expect("Query failed").unwrap();
            assert_eq!(found.title, "Landing page");
            assert_eq!(found.task_date, date(2024, 2, 1));
            assert_eq!(found.deadline, Some(date(2024, 2, 10)));
        }

        it "filters tasks by project and intern" {
            let website = create_test_project(&db, "Website");
            let app = create_test_project(&db, "App");
            let ada = create_test_intern(&db, "Ada");
            let grace = create_test_intern(&db, "Grace");
            create_test_task(&db, &website, &ada, "One");
            create_test_task(&db, &app, &ada, "Two");
            create_test_task(&db, &app, &grace, "Three");

            assert_eq!(db.get_all_tasks().expect("Query failed").len(), 3);
            assert_eq!(db.get_tasks_by_project(app.id).expect("Query failed").len(), 2);
            assert_eq!(db.get_tasks_by_intern(ada.id).expect("Query failed").len(), 2);
        }

        it "updates task status" {
            let project = create_test_project(&db, "Website");
            let ada = create_test_intern(&db, "Ada");
            let task = create_test_task(&db, &project, &ada, "Landing page");

            assert!(db.update_task_status(task.id, TaskStatus::Completed).expect("Update failed"));
            let found = db.get_task(task.id).expect("Query failed").unwrap();
            assert_eq!(found.status, TaskStatus::Completed);
            assert!(!db.update_task_status(999, TaskStatus::Completed).expect("Update failed"));
        }
    }

    describe "history" {
        it "returns entries in append order" {
            let project = create_test_project(&db, "Website");

            db.append_history(project.id, HistoryEvent::Assigned { intern_id: 7 })
                .expect("Append failed");
            db.append_history(project.id, HistoryEvent::StatusChanged {
                status: ProjectStatus::Completed,
                automatic: true,
            }).expect("Append failed");
            db.append_history(project.id, HistoryEvent::Note {
                message: "Wrapped up".to_string(),
            }).expect("Append failed");

            let history = db.get_project_history(project.id).expect("Query failed");
            let actions: Vec<&str> = history.iter().map(|h| h.event.action()).collect();
            assert_eq!(actions, vec!["assigned", "status_changed", "note"]);
            assert!(history[1].event.is_automatic());
            assert_eq!(history[2].event.message(), Some("Wrapped up"));
        }

        it "keeps history per project" {
            let website = create_test_project(&db, "Website");
            let app = create_test_project(&db, "App");
            db.append_history(website.id, HistoryEvent::Unassigned { intern_id: 3 })
                .expect("Append failed");

            assert_eq!(db.get_project_history(website.id).expect("Query failed").len(), 1);
            assert!(db.get_project_history(app.id).expect("Query failed").is_empty());
        }
    }
}

#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cohort.db");

    let project_id = {
        let db = Database::open(path.clone()).expect("Failed to open database");
        db.migrate().expect("Failed to run migrations");
        create_test_project(&db, "Durable").id
    };

    let db = Database::open(path).expect("Failed to reopen database");
    db.migrate().expect("Migrations should be idempotent");
    let project = db.get_project(project_id).expect("Query failed").unwrap();
    assert_eq!(project.name, "Durable");
}

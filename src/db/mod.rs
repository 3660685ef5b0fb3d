mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

const PROJECT_COLUMNS: &str = "id, name, status, created_at, updated_at";
const INTERN_COLUMNS: &str = "id, name, email, joined_date, bio, linkedin, created_at";
const TASK_COLUMNS: &str =
    "id, project_id, intern_id, title, description, task_date, deadline, status, created_at";
const HISTORY_COLUMNS: &str = "id, project_id, action, intern_id, status, message, automatic, created_at";

/// SQLite-backed storage for projects, interns, assignments, tasks and history.
///
/// This layer only stores and loads rows. Lifecycle rules (one-way project
/// status, the unassignment guard, automatic completion) live in
/// [`crate::workflow`].
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"
        ))?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: DbId) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
                [id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (name, status, created_at, updated_at) VALUES (?, ?, ?, ?)",
            (
                &input.name,
                ProjectStatus::InProgress.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id: conn.last_insert_rowid(),
            name: input.name,
            status: ProjectStatus::InProgress,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move a project from `from` to `to` in a single conditional update.
    ///
    /// Returns `false` if the project does not exist or is no longer in
    /// `from`, so of two racing writers only one observes the change.
    pub fn update_project_status(
        &self,
        id: DbId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE projects SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            (to.as_str(), Utc::now().to_rfc3339(), id, from.as_str()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Intern operations
    // ============================================================

    pub fn get_all_interns(&self) -> Result<Vec<Intern>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERN_COLUMNS} FROM interns ORDER BY name, id"
        ))?;

        let interns = stmt
            .query_map([], intern_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(interns)
    }

    pub fn get_intern(&self, id: DbId) -> Result<Option<Intern>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let intern = conn
            .query_row(
                &format!("SELECT {INTERN_COLUMNS} FROM interns WHERE id = ?"),
                [id],
                intern_from_row,
            )
            .optional()?;
        Ok(intern)
    }

    pub fn get_intern_by_email(&self, email: &str) -> Result<Option<Intern>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let intern = conn
            .query_row(
                &format!("SELECT {INTERN_COLUMNS} FROM interns WHERE email = ?"),
                [email],
                intern_from_row,
            )
            .optional()?;
        Ok(intern)
    }

    pub fn create_intern(&self, input: CreateInternInput) -> Result<Intern> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let profile = input.profile();

        conn.execute(
            "INSERT INTO interns (name, email, joined_date, bio, linkedin, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &input.name,
                &input.email,
                input.joined_date.format(DATE_FORMAT).to_string(),
                &input.bio,
                &input.linkedin,
                now.to_rfc3339(),
            ),
        )?;

        Ok(Intern {
            id: conn.last_insert_rowid(),
            name: input.name,
            email: input.email,
            joined_date: input.joined_date,
            profile,
            created_at: now,
        })
    }

    // ============================================================
    // Assignment operations
    // ============================================================

    /// Intern ids assigned to a project, in assignment order.
    pub fn get_assigned_interns(&self, project_id: DbId) -> Result<Vec<DbId>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT intern_id FROM project_interns WHERE project_id = ? ORDER BY rowid",
        )?;

        let ids = stmt
            .query_map([project_id], |row| row.get(0))?
            .collect::<Result<Vec<DbId>, _>>()?;

        Ok(ids)
    }

    pub fn get_all_assignments(&self) -> Result<AssignedInternsMap> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT project_id, intern_id FROM project_interns ORDER BY project_id, rowid",
        )?;

        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, DbId>(0)?, row.get::<_, DbId>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = AssignedInternsMap::new();
        for (project_id, intern_id) in pairs {
            map.entry(project_id).or_default().push(intern_id);
        }
        Ok(map)
    }

    /// Projects an intern is currently assigned to, in assignment order.
    pub fn get_projects_for_intern(&self, intern_id: DbId) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.status, p.created_at, p.updated_at
             FROM projects p
             JOIN project_interns pi ON pi.project_id = p.id
             WHERE pi.intern_id = ?
             ORDER BY pi.rowid",
        )?;

        let projects = stmt
            .query_map([intern_id], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    /// Insert (project, intern) pairs in list order, skipping pairs that exist.
    ///
    /// Each newly added intern gets an `assigned` history entry in the same
    /// transaction. Returns the intern ids that were newly assigned.
    pub fn assign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> Result<Vec<DbId>> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now();

        let mut added = Vec::new();
        for &intern_id in intern_ids {
            let rows = tx.execute(
                "INSERT OR IGNORE INTO project_interns (project_id, intern_id, assigned_at)
                 VALUES (?, ?, ?)",
                (project_id, intern_id, now.to_rfc3339()),
            )?;
            if rows > 0 {
                insert_history(&tx, project_id, &HistoryEvent::Assigned { intern_id }, now)?;
                added.push(intern_id);
            }
        }

        tx.commit()?;
        Ok(added)
    }

    /// Delete (project, intern) pairs in list order within one transaction.
    ///
    /// Each removed intern gets an `unassigned` history entry in the same
    /// transaction. Returns the intern ids that were actually removed.
    pub fn unassign_interns(&self, project_id: DbId, intern_ids: &[DbId]) -> Result<Vec<DbId>> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now();

        let mut removed = Vec::new();
        for &intern_id in intern_ids {
            let rows = tx.execute(
                "DELETE FROM project_interns WHERE project_id = ? AND intern_id = ?",
                (project_id, intern_id),
            )?;
            if rows > 0 {
                insert_history(&tx, project_id, &HistoryEvent::Unassigned { intern_id }, now)?;
                removed.push(intern_id);
            }
        }

        tx.commit()?;
        Ok(removed)
    }

    // ============================================================
    // Task operations
    // ============================================================

    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks("ORDER BY id", ())
    }

    pub fn get_tasks_by_project(&self, project_id: DbId) -> Result<Vec<Task>> {
        self.query_tasks("WHERE project_id = ? ORDER BY id", [project_id])
    }

    pub fn get_tasks_by_intern(&self, intern_id: DbId) -> Result<Vec<Task>> {
        self.query_tasks("WHERE intern_id = ? ORDER BY id", [intern_id])
    }

    pub fn get_task(&self, id: DbId) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                [id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn query_tasks<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks {clause}"))?;

        let tasks = stmt
            .query_map(params, task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn create_task(&self, intern_id: DbId, input: CreateTaskInput) -> Result<Task> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let task_date = input.task_date.unwrap_or_else(|| now.date_naive());

        conn.execute(
            "INSERT INTO tasks (project_id, intern_id, title, description, task_date, deadline, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                input.project_id,
                intern_id,
                &input.title,
                &input.description,
                task_date.format(DATE_FORMAT).to_string(),
                input.deadline.map(|d| d.format(DATE_FORMAT).to_string()),
                TaskStatus::Pending.as_str(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Task {
            id: conn.last_insert_rowid(),
            project_id: input.project_id,
            intern_id,
            title: input.title,
            description: input.description,
            task_date,
            deadline: input.deadline,
            status: TaskStatus::Pending,
            created_at: now,
        })
    }

    /// Overwrite a task's status. Returns `false` if the task does not exist.
    pub fn update_task_status(&self, id: DbId, status: TaskStatus) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE tasks SET status = ? WHERE id = ?",
            (status.as_str(), id),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Project History operations
    // ============================================================

    pub fn append_history(&self, project_id: DbId, event: HistoryEvent) -> Result<HistoryItem> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let id = insert_history(&conn, project_id, &event, now)?;

        Ok(HistoryItem {
            id,
            project_id,
            event,
            timestamp: now,
        })
    }

    /// History entries for a project, oldest first.
    pub fn get_project_history(&self, project_id: DbId) -> Result<Vec<HistoryItem>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM project_history WHERE project_id = ? ORDER BY id"
        ))?;

        let rows = stmt
            .query_map([project_id], |row| {
                let id: DbId = row.get(0)?;
                let action: String = row.get(2)?;
                let status: Option<String> = row.get(4)?;
                let event = HistoryEvent::from_parts(
                    &action,
                    row.get(3)?,
                    status.as_deref(),
                    row.get(5)?,
                    row.get(6)?,
                );
                Ok((id, action, event, parse_datetime(row.get::<_, String>(7)?)))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, action, event, timestamp) in rows {
            let event = event.with_context(|| {
                format!("History entry {} has malformed action '{}'", id, action)
            })?;
            entries.push(HistoryItem {
                id,
                project_id,
                event,
                timestamp,
            });
        }

        Ok(entries)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Database location under the platform data directory.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "cohort")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("cohort.db"))
}

fn insert_history(
    conn: &Connection,
    project_id: DbId,
    event: &HistoryEvent,
    at: DateTime<Utc>,
) -> rusqlite::Result<DbId> {
    conn.execute(
        "INSERT INTO project_history (project_id, action, intern_id, status, message, automatic, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            project_id,
            event.action(),
            event.intern_id(),
            event.status().map(|s| s.as_str()),
            event.message(),
            event.is_automatic(),
            at.to_rfc3339(),
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(2)?)
            .unwrap_or(ProjectStatus::InProgress),
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn intern_from_row(row: &Row<'_>) -> rusqlite::Result<Intern> {
    let intern = Intern {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        joined_date: parse_date(row.get::<_, String>(3)?),
        profile: None,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    };
    Ok(intern.with_profile_parts(row.get(4)?, row.get(5)?))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        intern_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        task_date: parse_date(row.get::<_, String>(5)?),
        deadline: row.get::<_, Option<String>>(6)?.map(parse_date),
        status: TaskStatus::from_str(&row.get::<_, String>(7)?).unwrap_or(TaskStatus::Pending),
        created_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn parse_date(s: String) -> NaiveDate {
    NaiveDate::parse_from_str(&s, DATE_FORMAT).unwrap_or_else(|_| Utc::now().date_naive())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

//! SQLite task backend.
//!
//! # Responsibility
//! - Store one row per task in the `tasks` table.
//! - Keep SQL details and blocking connection access inside this module.
//!
//! # Invariants
//! - Write paths call `Task::validate()` before SQL mutations.
//! - Read paths reject invalid rows instead of masking them.
//! - Read-modify-write operations run inside one transaction.
//! - All connection access happens on the blocking thread pool.

use crate::config::BackendKind;
use crate::db::{open_db, open_db_in_memory, timestamp_from_db, timestamp_to_db};
use crate::model::task::{Priority, Task, TaskDraft, TaskPatch};
use crate::repo::task_repo::{RepoError, RepoResult, TaskRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    priority,
    completed,
    created_at,
    completed_at
FROM tasks";

/// SQLite-backed task repository.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskRepository {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let conn = open_db(path)?;
        info!(
            "event=repo_open module=repo backend=sqlite status=ok path={}",
            path.display()
        );
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> RepoResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Opens a database file without blocking the async runtime.
    pub async fn open_async(path: PathBuf) -> RepoResult<Self> {
        tokio::task::spawn_blocking(move || Self::open(path))
            .await
            .map_err(join_error)?
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, op: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| RepoError::Io(std::io::Error::other("sqlite connection poisoned")))?;
            op(&mut guard)
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{TASK_SELECT_SQL} ORDER BY created_at DESC, id ASC;"))?;
            let mut rows = stmt.query([])?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next()? {
                tasks.push(parse_task_row(row)?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn get_task(&self, id: &str) -> RepoResult<Option<Task>> {
        let id = id.to_string();
        self.with_conn(move |conn| select_task(conn, &id)).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> RepoResult<Task> {
        let draft = draft.clone();
        self.with_conn(move |conn| {
            let task = Task::from_draft(Task::generate_id(), &draft);
            task.validate()?;

            conn.execute(
                "INSERT INTO tasks (
                    id,
                    title,
                    description,
                    priority,
                    completed,
                    created_at,
                    completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    task.id.as_str(),
                    task.title.as_str(),
                    task.description.as_deref(),
                    task.priority.as_str(),
                    bool_to_int(task.completed),
                    timestamp_to_db(task.created_at),
                    task.completed_at.map(timestamp_to_db),
                ],
            )?;
            Ok(task)
        })
        .await
    }

    async fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> RepoResult<Task> {
        let id = id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut task = select_task(&tx, &id)?.ok_or_else(|| RepoError::NotFound(id.clone()))?;

            let changed = task.apply_patch(&patch, now)?;
            if changed.is_empty() {
                return Ok(task);
            }
            task.validate()?;

            tx.execute(
                "UPDATE tasks
                 SET
                    title = ?1,
                    description = ?2,
                    priority = ?3,
                    completed = ?4,
                    completed_at = ?5
                 WHERE id = ?6;",
                params![
                    task.title.as_str(),
                    task.description.as_deref(),
                    task.priority.as_str(),
                    bool_to_int(task.completed),
                    task.completed_at.map(timestamp_to_db),
                    task.id.as_str(),
                ],
            )?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }

    async fn delete_task(&self, id: &str) -> RepoResult<Task> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let task = select_task(&tx, &id)?.ok_or_else(|| RepoError::NotFound(id.clone()))?;
            tx.execute("DELETE FROM tasks WHERE id = ?1;", [id.as_str()])?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }
}

fn select_task(conn: &Connection, id: &str) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id], |row| Ok(parse_task_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id: String = row.get("id")?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in tasks.priority for `{id}`"
        ))
    })?;

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid completed value `{other}` in tasks.completed for `{id}`"
            )));
        }
    };

    let created_text: String = row.get("created_at")?;
    let created_at = timestamp_from_db(&created_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp `{created_text}` in tasks.created_at for `{id}`"
        ))
    })?;

    let completed_at = match row.get::<_, Option<String>>("completed_at")? {
        Some(value) => Some(timestamp_from_db(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{value}` in tasks.completed_at for `{id}`"
            ))
        })?),
        None => None,
    };

    let task = Task {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        completed,
        created_at,
        completed_at,
    };
    task.validate()
        .map_err(|err| RepoError::InvalidData(format!("task `{}`: {err}", task.id)))?;
    Ok(task)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn join_error(err: tokio::task::JoinError) -> RepoError {
    RepoError::Io(std::io::Error::other(format!(
        "sqlite worker task failed: {err}"
    )))
}

//! Task repository contract shared by every storage backend.
//!
//! # Responsibility
//! - Define the one capability set every backend implements.
//! - Define the one error type every backend reports through.
//!
//! # Invariants
//! - Write paths validate records before they reach storage.
//! - Read paths reject invalid persisted records instead of masking them.
//! - Failures propagate to the caller; no backend turns a failed read into an
//!   empty list. The file backend's "missing or unparseable file is empty"
//!   rule is the only degraded read, and it is logged.
//! - `update_task` and `delete_task` on an unknown id return `NotFound`.

use crate::config::BackendKind;
use crate::db::DbError;
use crate::model::task::{Task, TaskDraft, TaskId, TaskPatch, TaskValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for every task backend.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    NotFound(TaskId),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Remote service answered with a non-success status.
    Remote {
        backend: BackendKind,
        status: u16,
        message: String,
    },
    /// Remote service could not be reached or the response body was unreadable.
    Transport(reqwest::Error),
    Db(DbError),
    InvalidData(String),
    Config(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Io(err) => write!(f, "storage io failed: {err}"),
            Self::Serialization(err) => write!(f, "task serialization failed: {err}"),
            Self::Remote {
                backend,
                status,
                message,
            } => write!(f, "{backend} backend returned status {status}: {message}"),
            Self::Transport(err) => write!(f, "remote request failed: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::Config(message) => write!(f, "invalid backend configuration: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Remote { .. } | Self::InvalidData(_) | Self::Config(_) => {
                None
            }
        }
    }
}

impl RepoError {
    /// Short stable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Remote { .. } => "remote_status",
            Self::Transport(_) => "transport",
            Self::Db(_) => "db",
            Self::InvalidData(_) => "invalid_data",
            Self::Config(_) => "config",
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for task persistence.
///
/// Implementations are shared across request handlers, so every method takes
/// `&self` and must be safe to call concurrently.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Which backend this repository talks to.
    fn backend(&self) -> BackendKind;

    /// Returns every stored task.
    async fn list_tasks(&self) -> RepoResult<Vec<Task>>;

    /// Returns one task by id.
    async fn get_task(&self, id: &str) -> RepoResult<Option<Task>>;

    /// Persists a new task and returns it with its assigned id.
    async fn create_task(&self, draft: &TaskDraft) -> RepoResult<Task>;

    /// Applies `patch` to an existing task and returns the stored result.
    async fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> RepoResult<Task>;

    /// Removes a task and returns the removed record.
    async fn delete_task(&self, id: &str) -> RepoResult<Task>;
}

/// Validates a batch of records loaded from storage.
pub(crate) fn validate_loaded(tasks: &[Task], source: &str) -> RepoResult<()> {
    for task in tasks {
        task.validate().map_err(|err| {
            RepoError::InvalidData(format!("task `{}` in {source}: {err}", task.id))
        })?;
    }
    Ok(())
}

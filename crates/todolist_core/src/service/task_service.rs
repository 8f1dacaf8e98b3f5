//! Task use-case service.
//!
//! # Responsibility
//! - Provide the entry points HTTP handlers call.
//! - Normalize client input and stamp timestamps before persistence.
//! - Map repository failures onto the three outcomes callers act on.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.
//! - Ids that cannot belong to any task are reported as `NotFound` without a
//!   storage round trip.

use crate::config::BackendKind;
use crate::model::board::{TaskBoard, TaskStats};
use crate::model::task::{NewTask, Task, TaskDraft, TaskId, TaskPatch, TaskValidationError};
use crate::repo::task_repo::{RepoError, TaskRepository};
use chrono::Utc;
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

static TASK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid task id regex"));

pub type ServiceResult<T> = Result<T, TaskServiceError>;

/// Service-level error, one variant per caller reaction.
#[derive(Debug)]
pub enum TaskServiceError {
    Validation(TaskValidationError),
    NotFound(TaskId),
    Backend(RepoError),
}

impl TaskServiceError {
    /// Stable code carried in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Backend(_) => "backend",
        }
    }
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Backend(err) => Some(err),
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Backend(other),
        }
    }
}

impl From<TaskValidationError> for TaskServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Returns whether `id` has the shape of a task id.
pub fn is_valid_task_id(id: &str) -> bool {
    TASK_ID_RE.is_match(id)
}

/// Use-case service over one task repository.
#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }

    pub fn backend(&self) -> BackendKind {
        self.repo.backend()
    }

    /// Lists every task in backend order.
    pub async fn list_tasks(&self) -> ServiceResult<Vec<Task>> {
        let started_at = Instant::now();
        let result = self.repo.list_tasks().await;
        self.finish("list", None, started_at, result)
    }

    pub async fn get_task(&self, id: &str) -> ServiceResult<Task> {
        let id = checked_id(id)?;
        let started_at = Instant::now();
        let result = self
            .repo
            .get_task(id)
            .await
            .and_then(|task| task.ok_or_else(|| RepoError::NotFound(id.to_string())));
        self.finish("get", Some(id), started_at, result)
    }

    /// Creates a pending task from client input.
    ///
    /// # Errors
    /// - `Validation` when the title is blank; nothing is persisted.
    pub async fn create_task(&self, input: NewTask) -> ServiceResult<Task> {
        let draft = TaskDraft::new(&input, Utc::now())?;
        let started_at = Instant::now();
        let result = self.repo.create_task(&draft).await;
        self.finish("create", None, started_at, result)
    }

    /// Applies a partial update.
    ///
    /// # Contract
    /// - An empty patch returns the stored task unchanged.
    /// - A blank title is a validation error; nothing is persisted.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> ServiceResult<Task> {
        let id = checked_id(id)?;
        let started_at = Instant::now();
        let result = self.repo.update_task(id, &patch, Utc::now()).await;
        self.finish("update", Some(id), started_at, result)
    }

    /// Deletes a task and returns the removed record.
    pub async fn delete_task(&self, id: &str) -> ServiceResult<Task> {
        let id = checked_id(id)?;
        let started_at = Instant::now();
        let result = self.repo.delete_task(id).await;
        self.finish("delete", Some(id), started_at, result)
    }

    pub async fn board(&self) -> ServiceResult<TaskBoard> {
        Ok(TaskBoard::from_tasks(self.list_tasks().await?))
    }

    pub async fn stats(&self) -> ServiceResult<TaskStats> {
        Ok(TaskStats::from_tasks(&self.list_tasks().await?))
    }

    fn finish<T>(
        &self,
        op: &str,
        id: Option<&str>,
        started_at: Instant,
        result: Result<T, RepoError>,
    ) -> ServiceResult<T> {
        let backend = self.repo.backend();
        let id = id.unwrap_or("-");
        let duration_ms = started_at.elapsed().as_millis();
        match result {
            Ok(value) => {
                info!(
                    "event=task_{op} module=service status=ok backend={backend} task_id={id} duration_ms={duration_ms}"
                );
                Ok(value)
            }
            Err(err) => {
                let err = TaskServiceError::from(err);
                if let TaskServiceError::Backend(source) = &err {
                    error!(
                        "event=task_{op} module=service status=error backend={backend} task_id={id} error_code={} duration_ms={duration_ms} error={source}",
                        source.code()
                    );
                } else {
                    info!(
                        "event=task_{op} module=service status=rejected backend={backend} task_id={id} error_code={} duration_ms={duration_ms}",
                        err.code()
                    );
                }
                Err(err)
            }
        }
    }
}

fn checked_id(id: &str) -> ServiceResult<&str> {
    if is_valid_task_id(id) {
        Ok(id)
    } else {
        Err(TaskServiceError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_task_id, TaskService, TaskServiceError};
    use crate::config::MemoryOptions;
    use crate::model::task::{NewTask, Priority, TaskPatch};
    use crate::repo::memory_repo::MemoryTaskRepository;
    use crate::repo::task_repo::RepoError;
    use std::sync::Arc;

    fn service() -> TaskService {
        TaskService::new(Arc::new(MemoryTaskRepository::in_memory(
            &MemoryOptions::default(),
        )))
    }

    #[test]
    fn task_id_shape() {
        assert!(is_valid_task_id("3f2b9c7e-1d2a-4c5b-9e8f-0a1b2c3d4e5f"));
        assert!(is_valid_task_id("sample_1"));
        assert!(!is_valid_task_id(""));
        assert!(!is_valid_task_id("../etc/passwd"));
        assert!(!is_valid_task_id(&"a".repeat(129)));
    }

    #[test]
    fn repo_errors_map_to_caller_outcomes() {
        assert!(matches!(
            TaskServiceError::from(RepoError::NotFound("x".to_string())),
            TaskServiceError::NotFound(_)
        ));
        let backend = TaskServiceError::from(RepoError::InvalidData("bad".to_string()));
        assert_eq!(backend.code(), "backend");
    }

    #[tokio::test]
    async fn malformed_id_is_not_found() {
        let err = service().get_task("no spaces allowed").await.unwrap_err();
        assert!(matches!(err, TaskServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn board_and_stats_reflect_completion() {
        let service = service();
        let urgent = service
            .create_task(NewTask::new("fix prod").with_priority(Priority::Urgent))
            .await
            .unwrap();
        let low = service
            .create_task(NewTask::new("water plants").with_priority(Priority::Low))
            .await
            .unwrap();
        service
            .update_task(&low.id, TaskPatch::completed(true))
            .await
            .unwrap();

        let board = service.board().await.unwrap();
        assert_eq!(board.pending.len(), 1);
        assert_eq!(board.pending[0].id, urgent.id);
        assert_eq!(board.completed[0].id, low.id);

        let stats = service.stats().await.unwrap();
        assert_eq!((stats.total, stats.completed, stats.pending), (2, 1, 1));
        assert_eq!(stats.by_priority[&Priority::Urgent], 1);
        assert_eq!(stats.by_priority[&Priority::Low], 0);
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_storage() {
        let service = service();
        let err = service.create_task(NewTask::new("   ")).await.unwrap_err();
        assert_eq!(err.code(), "validation");
        assert!(service.list_tasks().await.unwrap().is_empty());
    }
}

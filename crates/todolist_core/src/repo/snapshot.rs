//! Whole-collection repositories.
//!
//! # Responsibility
//! - Implement `TaskRepository` once for every backend that stores the task
//!   list as a single unit (file, memory, key-value, JSON blob).
//! - Serialize read-mutate-write cycles within one process.
//!
//! # Invariants
//! - Every operation loads the full collection, mutates it in memory and
//!   saves the full collection back while holding `op_lock`.
//! - Nothing is saved when an operation fails or changes nothing.
//! - Cross-process writers are not coordinated: last write wins.

use crate::config::BackendKind;
use crate::model::task::{Task, TaskDraft, TaskPatch};
use crate::repo::task_repo::{RepoError, RepoResult, TaskRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use std::time::Instant;
use tokio::sync::Mutex;

/// Raw load/save access to a whole task collection.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Loads the full collection.
    async fn load(&self) -> RepoResult<Vec<Task>>;

    /// Replaces the full collection.
    async fn save(&self, tasks: &[Task]) -> RepoResult<()>;
}

/// `TaskRepository` over any `SnapshotStore`.
pub struct SnapshotRepository<S> {
    store: S,
    op_lock: Mutex<()>,
}

impl<S: SnapshotStore> SnapshotRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            op_lock: Mutex::new(()),
        }
    }

    /// Underlying store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn save_logged(&self, op: &str, tasks: &[Task]) -> RepoResult<()> {
        let started_at = Instant::now();
        match self.store.save(tasks).await {
            Ok(()) => {
                debug!(
                    "event=snapshot_save module=repo backend={} op={op} status=ok count={} duration_ms={}",
                    self.store.backend(),
                    tasks.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=snapshot_save module=repo backend={} op={op} status=error error_code={} duration_ms={} error={}",
                    self.store.backend(),
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<S: SnapshotStore> TaskRepository for SnapshotRepository<S> {
    fn backend(&self) -> BackendKind {
        self.store.backend()
    }

    async fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let _guard = self.op_lock.lock().await;
        self.store.load().await
    }

    async fn get_task(&self, id: &str) -> RepoResult<Option<Task>> {
        let _guard = self.op_lock.lock().await;
        let tasks = self.store.load().await?;
        Ok(tasks.into_iter().find(|task| task.id == id))
    }

    async fn create_task(&self, draft: &TaskDraft) -> RepoResult<Task> {
        let _guard = self.op_lock.lock().await;
        let mut tasks = self.store.load().await?;

        let mut id = Task::generate_id();
        while tasks.iter().any(|task| task.id == id) {
            id = Task::generate_id();
        }
        let task = Task::from_draft(id, draft);
        task.validate()?;

        tasks.push(task.clone());
        self.save_logged("create", &tasks).await?;
        Ok(task)
    }

    async fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> RepoResult<Task> {
        let _guard = self.op_lock.lock().await;
        let mut tasks = self.store.load().await?;

        let slot = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        let mut updated = slot.clone();
        let changed = updated.apply_patch(patch, now)?;
        if changed.is_empty() {
            return Ok(updated);
        }
        updated.validate()?;
        *slot = updated.clone();

        self.save_logged("update", &tasks).await?;
        Ok(updated)
    }

    async fn delete_task(&self, id: &str) -> RepoResult<Task> {
        let _guard = self.op_lock.lock().await;
        let mut tasks = self.store.load().await?;

        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        let removed = tasks.remove(index);

        self.save_logged("delete", &tasks).await?;
        Ok(removed)
    }
}

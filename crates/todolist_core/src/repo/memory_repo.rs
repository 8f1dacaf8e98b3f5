//! Process-memory backend.
//!
//! Holds the collection inside the repository instance. Nothing survives a
//! restart; use it for tests and for deployments without durable storage.

use crate::config::{BackendKind, MemoryOptions};
use crate::model::task::{Priority, Task};
use crate::repo::snapshot::{SnapshotRepository, SnapshotStore};
use crate::repo::task_repo::RepoResult;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::warn;
use tokio::sync::RwLock;

/// Task repository held in process memory.
pub type MemoryTaskRepository = SnapshotRepository<MemoryStore>;

/// Snapshot store backed by a `Vec` owned by this instance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }
}

impl SnapshotRepository<MemoryStore> {
    /// Creates a memory repository, optionally seeded with sample tasks.
    pub fn in_memory(options: &MemoryOptions) -> Self {
        let tasks = if options.seed_samples {
            sample_tasks()
        } else {
            Vec::new()
        };
        warn!(
            "event=repo_open module=repo backend=memory status=ok durable=false seeded={}",
            tasks.len()
        );
        Self::new(MemoryStore::with_tasks(tasks))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn load(&self) -> RepoResult<Vec<Task>> {
        Ok(self.tasks.read().await.clone())
    }

    async fn save(&self, tasks: &[Task]) -> RepoResult<()> {
        *self.tasks.write().await = tasks.to_vec();
        Ok(())
    }
}

fn sample_tasks() -> Vec<Task> {
    let now = Utc::now();
    vec![
        Task {
            id: "sample-1".to_string(),
            title: "Storage is not durable".to_string(),
            description: Some(
                "Tasks are kept in process memory and disappear on restart. \
                 Configure a durable backend to keep them."
                    .to_string(),
            ),
            priority: Priority::Urgent,
            completed: false,
            created_at: now,
            completed_at: None,
        },
        Task {
            id: "sample-2".to_string(),
            title: "Example task".to_string(),
            description: Some("Sample data. Add, edit or delete tasks freely.".to_string()),
            priority: Priority::Medium,
            completed: false,
            created_at: now - Duration::minutes(5),
            completed_at: None,
        },
    ]
}

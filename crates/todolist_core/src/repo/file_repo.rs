//! JSON file backend.
//!
//! # Responsibility
//! - Persist the whole task list as one pretty-printed JSON array.
//!
//! # Invariants
//! - A missing or empty file is an empty collection.
//! - An unparseable file is an empty collection, reported at `warn`; the next
//!   successful write replaces it.
//! - Parseable records that break task invariants are an `InvalidData` error.
//! - Writes go to a sibling temp file first and are renamed into place, so a
//!   crash never leaves a half-written document behind.

use crate::config::BackendKind;
use crate::model::task::Task;
use crate::repo::snapshot::{SnapshotRepository, SnapshotStore};
use crate::repo::task_repo::{validate_loaded, RepoResult};
use async_trait::async_trait;
use log::{info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Task repository persisted to one local JSON file.
pub type FileTaskRepository = SnapshotRepository<FileStore>;

/// Snapshot store for a local JSON document.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotRepository<FileStore> {
    /// Opens a file-backed repository. The file itself is created lazily on
    /// the first write.
    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        let store = FileStore::new(path);
        info!(
            "event=repo_open module=repo backend=file status=ok path={}",
            store.path.display()
        );
        Self::new(store)
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    fn backend(&self) -> BackendKind {
        BackendKind::File
    }

    async fn load(&self) -> RepoResult<Vec<Task>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tasks: Vec<Task> = match serde_json::from_str(&raw) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(
                    "event=file_parse module=repo backend=file status=degraded path={} line={} column={} action=treat_as_empty",
                    self.path.display(),
                    err.line(),
                    err.column()
                );
                return Ok(Vec::new());
            }
        };

        validate_loaded(&tasks, &self.path.display().to_string())?;
        Ok(tasks)
    }

    async fn save(&self, tasks: &[Task]) -> RepoResult<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(tasks)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, body).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

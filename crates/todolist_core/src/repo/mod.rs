//! Repository layer: task persistence contract and backends.
//!
//! # Responsibility
//! - Define the storage contract (`TaskRepository`) every backend satisfies.
//! - Pick and open exactly one backend from `StoreConfig`.
//!
//! # Invariants
//! - Repository writes enforce `Task::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   transport and storage errors.
//! - The chosen backend is fixed for the lifetime of the returned handle.

pub mod file_repo;
pub mod firestore_repo;
pub mod jsonbin_repo;
pub mod kv_repo;
pub mod memory_repo;
pub(crate) mod remote;
pub mod snapshot;
pub mod sqlite_repo;
pub mod task_repo;

use crate::config::{BackendConfig, StoreConfig};
use file_repo::FileTaskRepository;
use firestore_repo::{FirestoreOptions, FirestoreTaskRepository};
use jsonbin_repo::{JsonBinStore, JsonBinTaskRepository};
use kv_repo::{KvStore, KvTaskRepository};
use log::{error, info};
use memory_repo::MemoryTaskRepository;
use sqlite_repo::SqliteTaskRepository;
use std::sync::Arc;
use std::time::Instant;
use task_repo::{RepoResult, TaskRepository};

/// Opens the backend described by `config`.
///
/// # Side effects
/// - Local backends may create parent directories (sqlite creates its file).
/// - Emits `repo_select` logging events.
///
/// # Errors
/// - Backend construction failures (invalid parameters, sqlite open or
///   migration failures, HTTP client setup).
pub async fn open_repository(config: &StoreConfig) -> RepoResult<Arc<dyn TaskRepository>> {
    let started_at = Instant::now();
    let kind = config.backend.kind();
    let result = open_backend(config).await;

    match &result {
        Ok(_) => info!(
            "event=repo_select module=repo status=ok backend={kind} durable={} duration_ms={}",
            kind.is_durable(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=repo_select module=repo status=error backend={kind} error_code={} error={}",
            err.code(),
            err
        ),
    }
    result
}

async fn open_backend(config: &StoreConfig) -> RepoResult<Arc<dyn TaskRepository>> {
    let timeout = config.http_timeout;
    let repo: Arc<dyn TaskRepository> = match &config.backend {
        BackendConfig::File { path } => Arc::new(FileTaskRepository::open_file(path.clone())),
        BackendConfig::Memory(options) => Arc::new(MemoryTaskRepository::in_memory(options)),
        BackendConfig::Sqlite { path } => {
            Arc::new(SqliteTaskRepository::open_async(path.clone()).await?)
        }
        BackendConfig::Firestore {
            project_id,
            api_key,
            collection,
            base_url,
        } => Arc::new(FirestoreTaskRepository::new(FirestoreOptions {
            base_url: base_url.clone(),
            project_id: project_id.clone(),
            api_key: api_key.clone(),
            collection: collection.clone(),
            timeout,
        })?),
        BackendConfig::KeyValue { url, token, key } => Arc::new(KvTaskRepository::open_kv(
            KvStore::new(url.as_str(), token.as_str(), key.as_str(), timeout)?,
        )),
        BackendConfig::JsonBin {
            api_key,
            bin_id,
            base_url,
            cache_ttl,
        } => Arc::new(JsonBinTaskRepository::open_jsonbin(JsonBinStore::new(
            base_url.as_str(),
            bin_id.as_str(),
            api_key.as_str(),
            *cache_ttl,
            timeout,
        )?)),
    };
    Ok(repo)
}

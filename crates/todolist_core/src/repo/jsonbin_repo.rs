//! JSONBin blob backend with a short-lived read cache.
//!
//! # Responsibility
//! - Store the whole task list as the record of one bin.
//! - Skip remote reads while the last known record is fresh.
//!
//! # Invariants
//! - A cached record is served only within `cache_ttl` of the fetch or write
//!   that produced it.
//! - Writes always go to the remote bin immediately; a successful write
//!   refreshes the cache, a failed write drops it.
//! - A failed remote read is an error; stale cache is never served instead.

use crate::config::BackendKind;
use crate::model::task::Task;
use crate::repo::remote::{build_client, ensure_success, join_url};
use crate::repo::snapshot::{SnapshotRepository, SnapshotStore};
use crate::repo::task_repo::{validate_loaded, RepoError, RepoResult};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const MASTER_KEY_HEADER: &str = "X-Master-Key";

/// Task repository stored in one JSONBin bin.
pub type JsonBinTaskRepository = SnapshotRepository<JsonBinStore>;

#[derive(Debug, Clone)]
struct CachedRecord {
    tasks: Vec<Task>,
    stored_at: Instant,
}

#[derive(Debug, Deserialize)]
struct BinEnvelope {
    #[serde(default)]
    record: Value,
}

/// Snapshot store for one JSONBin bin.
#[derive(Debug)]
pub struct JsonBinStore {
    client: Client,
    base_url: String,
    bin_id: String,
    api_key: String,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedRecord>>,
}

impl JsonBinStore {
    pub fn new(
        base_url: impl Into<String>,
        bin_id: impl Into<String>,
        api_key: impl Into<String>,
        cache_ttl: Duration,
        timeout: Duration,
    ) -> RepoResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            bin_id: bin_id.into(),
            api_key: api_key.into(),
            cache_ttl,
            cache: Mutex::new(None),
        })
    }

    /// Drops the cached record so the next read goes remote.
    pub async fn invalidate_cache(&self) {
        *self.cache.lock().await = None;
    }

    async fn fetch(&self) -> RepoResult<Vec<Task>> {
        let url = join_url(&self.base_url, &format!("b/{}/latest", self.bin_id));
        let response = self
            .client
            .get(url)
            .header(MASTER_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let envelope: BinEnvelope = ensure_success(BackendKind::JsonBin, response)
            .await?
            .json()
            .await?;

        let tasks: Vec<Task> = match envelope.record {
            Value::Null => Vec::new(),
            record @ Value::Array(_) => serde_json::from_value(record)?,
            _ => {
                return Err(RepoError::InvalidData(format!(
                    "bin `{}` record is not a task list",
                    self.bin_id
                )));
            }
        };
        validate_loaded(&tasks, &format!("jsonbin bin `{}`", self.bin_id))?;
        Ok(tasks)
    }
}

impl SnapshotRepository<JsonBinStore> {
    pub fn open_jsonbin(store: JsonBinStore) -> Self {
        info!(
            "event=repo_open module=repo backend=jsonbin status=ok bin={} cache_ttl_ms={}",
            store.bin_id,
            store.cache_ttl.as_millis()
        );
        Self::new(store)
    }
}

#[async_trait]
impl SnapshotStore for JsonBinStore {
    fn backend(&self) -> BackendKind {
        BackendKind::JsonBin
    }

    async fn load(&self) -> RepoResult<Vec<Task>> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.stored_at.elapsed() < self.cache_ttl {
                debug!(
                    "event=jsonbin_cache module=repo backend=jsonbin status=hit count={}",
                    cached.tasks.len()
                );
                return Ok(cached.tasks.clone());
            }
        }

        let tasks = self.fetch().await?;
        *cache = Some(CachedRecord {
            tasks: tasks.clone(),
            stored_at: Instant::now(),
        });
        Ok(tasks)
    }

    async fn save(&self, tasks: &[Task]) -> RepoResult<()> {
        let mut cache = self.cache.lock().await;
        let url = join_url(&self.base_url, &format!("b/{}", self.bin_id));

        let result = async {
            let response = self
                .client
                .put(url)
                .header(MASTER_KEY_HEADER, &self.api_key)
                .json(tasks)
                .send()
                .await?;
            ensure_success(BackendKind::JsonBin, response).await?;
            Ok::<(), RepoError>(())
        }
        .await;

        *cache = match &result {
            Ok(()) => Some(CachedRecord {
                tasks: tasks.to_vec(),
                stored_at: Instant::now(),
            }),
            Err(_) => None,
        };
        result
    }
}

//! Redis-compatible REST key-value backend.
//!
//! # Responsibility
//! - Store the whole task list as one JSON string under a fixed key.
//! - Speak the REST command protocol used by hosted Redis services:
//!   `POST {url}` with a JSON command array and a bearer token, answered by
//!   `{"result": ...}` or `{"error": "..."}`.
//!
//! # Invariants
//! - A missing key is an empty collection.
//! - Every failure (transport, status, command error, bad payload) is
//!   returned to the caller.

use crate::config::BackendKind;
use crate::model::task::Task;
use crate::repo::remote::{build_client, ensure_success};
use crate::repo::snapshot::{SnapshotRepository, SnapshotStore};
use crate::repo::task_repo::{validate_loaded, RepoError, RepoResult};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Task repository stored under one key of a REST key-value service.
pub type KvTaskRepository = SnapshotRepository<KvStore>;

/// Snapshot store for one key in a REST key-value service.
#[derive(Debug, Clone)]
pub struct KvStore {
    client: Client,
    url: String,
    token: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl KvStore {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> RepoResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            token: token.into(),
            key: key.into(),
        })
    }

    async fn command(&self, command: Value) -> RepoResult<Option<Value>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;
        let reply: KvReply = ensure_success(BackendKind::KeyValue, response)
            .await?
            .json()
            .await?;

        if let Some(message) = reply.error {
            return Err(RepoError::Remote {
                backend: BackendKind::KeyValue,
                status: 200,
                message,
            });
        }
        Ok(reply.result.filter(|value| !value.is_null()))
    }
}

impl SnapshotRepository<KvStore> {
    pub fn open_kv(store: KvStore) -> Self {
        info!(
            "event=repo_open module=repo backend=kv status=ok key={}",
            store.key
        );
        Self::new(store)
    }
}

#[async_trait]
impl SnapshotStore for KvStore {
    fn backend(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn load(&self) -> RepoResult<Vec<Task>> {
        let tasks: Vec<Task> = match self.command(json!(["GET", self.key])).await? {
            None => return Ok(Vec::new()),
            Some(Value::String(encoded)) => serde_json::from_str(&encoded)?,
            Some(value @ Value::Array(_)) => serde_json::from_value(value)?,
            Some(other) => {
                return Err(RepoError::InvalidData(format!(
                    "key `{}` holds a non-list value: {}",
                    self.key,
                    type_name(&other)
                )));
            }
        };
        validate_loaded(&tasks, &format!("kv key `{}`", self.key))?;
        Ok(tasks)
    }

    async fn save(&self, tasks: &[Task]) -> RepoResult<()> {
        let encoded = serde_json::to_string(tasks)?;
        self.command(json!(["SET", self.key, encoded])).await?;
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

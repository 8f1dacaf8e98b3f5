//! Firestore document backend (REST v1).
//!
//! # Responsibility
//! - Store one document per task in a collection.
//! - Encode/decode task fields as Firestore typed values.
//!
//! # Invariants
//! - Task ids are the document ids assigned by Firestore on create.
//! - `list_tasks` is ordered by `createdAt` descending.
//! - `update_task` writes only the changed fields (update mask) and returns
//!   the document as re-read after the write.
//! - Unknown ids surface as `NotFound` for update and delete.
//!
//! # See also
//! - https://firebase.google.com/docs/firestore/reference/rest

use crate::config::BackendKind;
use crate::model::task::{Priority, Task, TaskDraft, TaskPatch};
use crate::repo::remote::{build_client, ensure_success, join_url};
use crate::repo::task_repo::{RepoError, RepoResult, TaskRepository};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

const FIELD_TITLE: &str = "title";
const FIELD_DESCRIPTION: &str = "description";
const FIELD_PRIORITY: &str = "priority";
const FIELD_COMPLETED: &str = "completed";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_COMPLETED_AT: &str = "completedAt";

/// Connection parameters for one Firestore collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreOptions {
    pub base_url: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout: Duration,
}

/// Firestore document as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

/// Task repository with one Firestore document per task.
pub struct FirestoreTaskRepository {
    client: Client,
    documents_url: String,
    api_key: Option<String>,
    collection: String,
}

impl FirestoreTaskRepository {
    pub fn new(options: FirestoreOptions) -> RepoResult<Self> {
        if options.project_id.trim().is_empty() {
            return Err(RepoError::Config("firestore project id is empty".to_string()));
        }
        if options.collection.trim().is_empty() || options.collection.contains('/') {
            return Err(RepoError::Config(format!(
                "invalid firestore collection `{}`",
                options.collection
            )));
        }

        let documents_url = join_url(
            &options.base_url,
            &format!(
                "projects/{}/databases/(default)/documents",
                options.project_id
            ),
        );
        info!(
            "event=repo_open module=repo backend=firestore status=ok project={} collection={}",
            options.project_id, options.collection
        );

        Ok(Self {
            client: build_client(options.timeout)?,
            documents_url,
            api_key: options.api_key,
            collection: options.collection,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.documents_url, self.collection)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, self.collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    async fn fetch_document(&self, id: &str) -> RepoResult<Option<Task>> {
        let response = self
            .authorize(self.client.get(self.document_url(id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Document = ensure_success(BackendKind::Firestore, response)
            .await?
            .json()
            .await?;
        decode_document(&document).map(Some)
    }
}

#[async_trait]
impl TaskRepository for FirestoreTaskRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Firestore
    }

    async fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "orderBy": [{
                    "field": { "fieldPath": FIELD_CREATED_AT },
                    "direction": "DESCENDING"
                }]
            }
        });
        let response = self
            .authorize(
                self.client
                    .post(format!("{}:runQuery", self.documents_url))
                    .json(&query),
            )
            .send()
            .await?;
        let items: Vec<RunQueryItem> = ensure_success(BackendKind::Firestore, response)
            .await?
            .json()
            .await?;

        let tasks = items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .map(decode_document)
            .collect::<RepoResult<Vec<Task>>>()?;
        debug!(
            "event=firestore_query module=repo backend=firestore status=ok count={}",
            tasks.len()
        );
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> RepoResult<Option<Task>> {
        self.fetch_document(id).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> RepoResult<Task> {
        let pending = Task::from_draft("pending", draft);
        pending.validate()?;

        let body = json!({ "fields": encode_fields(&pending, ALL_FIELDS) });
        let response = self
            .authorize(self.client.post(self.collection_url()).json(&body))
            .send()
            .await?;
        let document: Document = ensure_success(BackendKind::Firestore, response)
            .await?
            .json()
            .await?;

        let created = decode_document(&document)?;
        debug!(
            "event=firestore_create module=repo backend=firestore status=ok task_id={}",
            created.id
        );
        Ok(created)
    }

    async fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> RepoResult<Task> {
        let current = self
            .fetch_document(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        let mut updated = current.clone();
        let changed = updated.apply_patch(patch, now)?;
        if changed.is_empty() {
            return Ok(current);
        }
        updated.validate()?;

        let mut query: Vec<(&str, &str)> = changed
            .iter()
            .map(|field| ("updateMask.fieldPaths", *field))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let body = json!({ "fields": encode_fields(&updated, &changed) });
        let response = self
            .authorize(
                self.client
                    .patch(self.document_url(id))
                    .query(&query)
                    .json(&body),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound(id.to_string()));
        }
        ensure_success(BackendKind::Firestore, response).await?;

        self.fetch_document(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    async fn delete_task(&self, id: &str) -> RepoResult<Task> {
        let current = self
            .fetch_document(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        let response = self
            .authorize(
                self.client
                    .delete(self.document_url(id))
                    .query(&[("currentDocument.exists", "true")]),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound(id.to_string()));
        }
        ensure_success(BackendKind::Firestore, response).await?;
        Ok(current)
    }
}

const ALL_FIELDS: &[&str] = &[
    FIELD_TITLE,
    FIELD_DESCRIPTION,
    FIELD_PRIORITY,
    FIELD_COMPLETED,
    FIELD_CREATED_AT,
    FIELD_COMPLETED_AT,
];

fn encode_fields(task: &Task, fields: &[&str]) -> Map<String, Value> {
    let mut encoded = Map::new();
    for field in fields {
        let value = match *field {
            FIELD_TITLE => string_value(&task.title),
            FIELD_DESCRIPTION => optional(task.description.as_deref().map(string_value)),
            FIELD_PRIORITY => string_value(task.priority.as_str()),
            FIELD_COMPLETED => json!({ "booleanValue": task.completed }),
            FIELD_CREATED_AT => timestamp_value(task.created_at),
            FIELD_COMPLETED_AT => optional(task.completed_at.map(timestamp_value)),
            _ => continue,
        };
        encoded.insert((*field).to_string(), value);
    }
    encoded
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
}

fn optional(value: Option<Value>) -> Value {
    value.unwrap_or_else(|| json!({ "nullValue": null }))
}

fn document_id(name: &str) -> RepoResult<&str> {
    name.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RepoError::InvalidData(format!("document name `{name}` has no id")))
}

fn decode_document(document: &Document) -> RepoResult<Task> {
    let id = document_id(&document.name)?;
    let invalid = |field: &str| {
        RepoError::InvalidData(format!("document `{id}` has invalid field `{field}`"))
    };

    let title = read_string(&document.fields, FIELD_TITLE)
        .ok_or_else(|| invalid(FIELD_TITLE))?
        .to_string();
    let description = read_string(&document.fields, FIELD_DESCRIPTION).map(str::to_string);
    let priority = match read_string(&document.fields, FIELD_PRIORITY) {
        Some(value) => Priority::parse(value).ok_or_else(|| invalid(FIELD_PRIORITY))?,
        None => Priority::default(),
    };
    let completed = document
        .fields
        .get(FIELD_COMPLETED)
        .and_then(|value| value.get("booleanValue"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // A pending server timestamp is not visible yet; fall back to the
    // document create time.
    let created_at = match read_timestamp(&document.fields, FIELD_CREATED_AT) {
        Some(parsed) => parsed.ok_or_else(|| invalid(FIELD_CREATED_AT))?,
        None => document
            .create_time
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| invalid(FIELD_CREATED_AT))?,
    };
    let completed_at = match read_timestamp(&document.fields, FIELD_COMPLETED_AT) {
        Some(parsed) => Some(parsed.ok_or_else(|| invalid(FIELD_COMPLETED_AT))?),
        None => None,
    };

    let task = Task {
        id: id.to_string(),
        title,
        description,
        priority,
        completed,
        created_at,
        completed_at,
    };
    task.validate()
        .map_err(|err| RepoError::InvalidData(format!("document `{id}`: {err}")))?;
    Ok(task)
}

fn read_string<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
}

/// `None` when the field is absent or null; `Some(None)` when present but
/// unparseable.
fn read_timestamp(fields: &Map<String, Value>, name: &str) -> Option<Option<DateTime<Utc>>> {
    let raw = fields.get(name)?.get("timestampValue")?;
    Some(raw.as_str().and_then(parse_timestamp))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::{decode_document, encode_fields, Document, ALL_FIELDS};
    use crate::model::task::{Priority, Task};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn document(value: serde_json::Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn encode_then_decode_preserves_task() {
        let created_at = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        let task = Task {
            id: "abc123".to_string(),
            title: "Buy milk".to_string(),
            description: None,
            priority: Priority::Low,
            completed: true,
            created_at,
            completed_at: Some(created_at),
        };

        let fields = encode_fields(&task, ALL_FIELDS);
        assert_eq!(fields["description"], json!({ "nullValue": null }));
        assert_eq!(fields["createdAt"]["timestampValue"], "2025-02-03T04:05:06Z");

        let decoded = decode_document(&document(json!({
            "name": "projects/p/databases/(default)/documents/todos/abc123",
            "fields": fields,
        })))
        .unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn encode_limits_output_to_requested_fields() {
        let task = Task {
            id: "x".to_string(),
            title: "t".to_string(),
            description: None,
            priority: Priority::High,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        };
        let fields = encode_fields(&task, &["priority"]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["priority"]["stringValue"], "high");
    }

    #[test]
    fn decode_falls_back_to_create_time() {
        let decoded = decode_document(&document(json!({
            "name": "projects/p/databases/(default)/documents/todos/d1",
            "createTime": "2024-12-31T23:59:59.5Z",
            "fields": {
                "title": { "stringValue": "Call mom" },
                "completed": { "booleanValue": false },
                "completedAt": { "nullValue": null }
            }
        })))
        .unwrap();
        assert_eq!(decoded.id, "d1");
        assert_eq!(decoded.priority, Priority::Medium);
        assert_eq!(
            decoded.created_at.to_rfc3339(),
            "2024-12-31T23:59:59.500+00:00"
        );
    }

    #[test]
    fn decode_rejects_unknown_priority_and_inconsistent_completion() {
        let bad_priority = decode_document(&document(json!({
            "name": "projects/p/databases/(default)/documents/todos/d2",
            "fields": {
                "title": { "stringValue": "x" },
                "priority": { "stringValue": "critical" },
                "createdAt": { "timestampValue": "2025-01-01T00:00:00Z" }
            }
        })));
        assert!(bad_priority.is_err());

        let mismatch = decode_document(&document(json!({
            "name": "projects/p/databases/(default)/documents/todos/d3",
            "fields": {
                "title": { "stringValue": "x" },
                "completed": { "booleanValue": true },
                "createdAt": { "timestampValue": "2025-01-01T00:00:00Z" }
            }
        })));
        assert!(mismatch.is_err());
    }
}

//! In-process fakes of the remote storage APIs, served on 127.0.0.1:0.

#![allow(dead_code)]

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Reply = (StatusCode, Json<Value>);

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn status_error(status: StatusCode, message: &str) -> Reply {
    (
        status,
        Json(json!({ "error": { "code": status.as_u16(), "message": message } })),
    )
}

// ---------------------------------------------------------------------------
// REST key-value service

pub const KV_TOKEN: &str = "kv-test-token";

#[derive(Default)]
pub struct KvState {
    pub values: Mutex<BTreeMap<String, String>>,
    pub commands: AtomicUsize,
}

pub struct FakeKv {
    pub url: String,
    pub state: Arc<KvState>,
}

impl FakeKv {
    pub async fn start() -> Self {
        let state = Arc::new(KvState::default());
        let app = Router::new()
            .route("/", post(kv_command))
            .with_state(Arc::clone(&state));
        let addr = serve(app).await;
        Self {
            url: format!("http://{addr}/"),
            state,
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.values.lock().unwrap().get(key).cloned()
    }

    pub fn set_raw(&self, key: &str, value: &str) {
        self.state
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

async fn kv_command(
    State(state): State<Arc<KvState>>,
    headers: HeaderMap,
    Json(command): Json<Vec<Value>>,
) -> Reply {
    let expected = format!("Bearer {KV_TOKEN}");
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }
    state.commands.fetch_add(1, Ordering::SeqCst);

    let name = command
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();
    let mut values = state.values.lock().unwrap();
    match (name.as_str(), command.get(1).and_then(Value::as_str)) {
        ("GET", Some(key)) => (StatusCode::OK, Json(json!({ "result": values.get(key) }))),
        ("SET", Some(key)) => match command.get(2).and_then(Value::as_str) {
            Some(value) => {
                values.insert(key.to_string(), value.to_string());
                (StatusCode::OK, Json(json!({ "result": "OK" })))
            }
            None => (
                StatusCode::OK,
                Json(json!({ "error": "ERR wrong number of arguments for 'set' command" })),
            ),
        },
        _ => (
            StatusCode::OK,
            Json(json!({ "error": format!("ERR unknown command '{name}'") })),
        ),
    }
}

// ---------------------------------------------------------------------------
// JSONBin

pub const JSONBIN_KEY: &str = "jsonbin-test-key";
pub const JSONBIN_BIN: &str = "bin-123";

pub struct JsonBinState {
    pub record: Mutex<Value>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

pub struct FakeJsonBin {
    pub base_url: String,
    pub state: Arc<JsonBinState>,
}

impl FakeJsonBin {
    pub async fn start() -> Self {
        let state = Arc::new(JsonBinState {
            record: Mutex::new(json!([])),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        });
        let app = Router::new()
            .route("/v3/b/{bin}/latest", get(jsonbin_read))
            .route("/v3/b/{bin}", put(jsonbin_write))
            .with_state(Arc::clone(&state));
        let addr = serve(app).await;
        Self {
            base_url: format!("http://{addr}/v3"),
            state,
        }
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> Value {
        self.state.record.lock().unwrap().clone()
    }

    pub fn set_record(&self, record: Value) {
        *self.state.record.lock().unwrap() = record;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn jsonbin_authorized(headers: &HeaderMap, bin: &str) -> Result<(), Reply> {
    if bin != JSONBIN_BIN {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Bin not found" })),
        ));
    }
    let key = headers.get("x-master-key").and_then(|value| value.to_str().ok());
    if key != Some(JSONBIN_KEY) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid X-Master-Key provided" })),
        ));
    }
    Ok(())
}

async fn jsonbin_read(
    State(state): State<Arc<JsonBinState>>,
    Path(bin): Path<String>,
    headers: HeaderMap,
) -> Reply {
    if let Err(reply) = jsonbin_authorized(&headers, &bin) {
        return reply;
    }
    state.reads.fetch_add(1, Ordering::SeqCst);
    let record = state.record.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(json!({ "record": record, "metadata": { "id": bin, "private": true } })),
    )
}

async fn jsonbin_write(
    State(state): State<Arc<JsonBinState>>,
    Path(bin): Path<String>,
    headers: HeaderMap,
    Json(record): Json<Value>,
) -> Reply {
    if let Err(reply) = jsonbin_authorized(&headers, &bin) {
        return reply;
    }
    if state.fail_writes.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "try again later" })),
        );
    }
    state.writes.fetch_add(1, Ordering::SeqCst);
    *state.record.lock().unwrap() = record.clone();
    (
        StatusCode::OK,
        Json(json!({ "record": record, "metadata": { "parentId": bin, "private": true } })),
    )
}

// ---------------------------------------------------------------------------
// Firestore REST v1

pub const FIRESTORE_PROJECT: &str = "demo-project";
pub const FIRESTORE_KEY: &str = "firestore-test-key";

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub fields: Map<String, Value>,
    pub create_time: DateTime<Utc>,
}

#[derive(Default)]
pub struct FirestoreState {
    /// `collection/id` -> document.
    pub documents: Mutex<BTreeMap<String, StoredDocument>>,
    pub next_id: AtomicUsize,
    /// Update masks seen on PATCH, in call order.
    pub patch_masks: Mutex<Vec<Vec<String>>>,
}

pub struct FakeFirestore {
    pub base_url: String,
    pub state: Arc<FirestoreState>,
}

impl FakeFirestore {
    pub async fn start() -> Self {
        let state = Arc::new(FirestoreState::default());
        let app = Router::new()
            .route(
                "/v1/projects/{project}/databases/{database}/documents:runQuery",
                post(firestore_run_query),
            )
            .route(
                "/v1/projects/{project}/databases/{database}/documents/{collection}",
                post(firestore_create),
            )
            .route(
                "/v1/projects/{project}/databases/{database}/documents/{collection}/{id}",
                get(firestore_get)
                    .patch(firestore_patch)
                    .delete(firestore_delete),
            )
            .with_state(Arc::clone(&state));
        let addr = serve(app).await;
        Self {
            base_url: format!("http://{addr}/v1"),
            state,
        }
    }

    pub fn insert_raw(&self, collection: &str, id: &str, fields: Value, create_time: DateTime<Utc>) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.state.documents.lock().unwrap().insert(
            format!("{collection}/{id}"),
            StoredDocument {
                fields,
                create_time,
            },
        );
    }

    pub fn patch_masks(&self) -> Vec<Vec<String>> {
        self.state.patch_masks.lock().unwrap().clone()
    }
}

type DocPath = Path<(String, String, String, String)>;

fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn firestore_authorized(project: &str, query: &[(String, String)]) -> Result<(), Reply> {
    if project != FIRESTORE_PROJECT {
        return Err(status_error(StatusCode::FORBIDDEN, "project mismatch"));
    }
    let has_key = query
        .iter()
        .any(|(key, value)| key == "key" && value == FIRESTORE_KEY);
    if !has_key {
        return Err(status_error(StatusCode::FORBIDDEN, "missing api key"));
    }
    Ok(())
}

/// Firestore keeps timestamps at microsecond precision and drops the rest.
fn to_stored_precision(mut fields: Map<String, Value>) -> Map<String, Value> {
    for value in fields.values_mut() {
        let parsed = value
            .get("timestampValue")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
        if let Some(parsed) = parsed {
            let micros = parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            *value = json!({ "timestampValue": micros });
        }
    }
    fields
}

fn render_document(project: &str, path: &str, doc: &StoredDocument) -> Value {
    json!({
        "name": format!("projects/{project}/databases/(default)/documents/{path}"),
        "fields": doc.fields,
        "createTime": doc.create_time.to_rfc3339_opts(SecondsFormat::Micros, true),
        "updateTime": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

fn created_at_of(doc: &StoredDocument) -> DateTime<Utc> {
    doc.fields
        .get("createdAt")
        .and_then(|value| value.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(doc.create_time)
}

async fn firestore_run_query(
    State(state): State<Arc<FirestoreState>>,
    Path((project, _database)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = firestore_authorized(&project, &query_pairs(raw.as_deref())) {
        return reply;
    }
    let collection = body["structuredQuery"]["from"][0]["collectionId"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let descending = body["structuredQuery"]["orderBy"][0]["direction"] == "DESCENDING";
    let prefix = format!("{collection}/");

    let documents = state.documents.lock().unwrap();
    let mut matches: Vec<(&String, &StoredDocument)> = documents
        .iter()
        .filter(|(path, _)| path.starts_with(&prefix))
        .collect();
    matches.sort_by_key(|(_, doc)| created_at_of(doc));
    if descending {
        matches.reverse();
    }

    let read_time = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let items: Vec<Value> = if matches.is_empty() {
        vec![json!({ "readTime": read_time })]
    } else {
        matches
            .into_iter()
            .map(|(path, doc)| {
                json!({ "document": render_document(&project, path, doc), "readTime": read_time })
            })
            .collect()
    };
    (StatusCode::OK, Json(Value::Array(items)))
}

async fn firestore_create(
    State(state): State<Arc<FirestoreState>>,
    Path((project, _database, collection)): Path<(String, String, String)>,
    RawQuery(raw): RawQuery,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = firestore_authorized(&project, &query_pairs(raw.as_deref())) {
        return reply;
    }
    let fields = match body.get("fields") {
        Some(Value::Object(map)) => to_stored_precision(map.clone()),
        _ => return status_error(StatusCode::BAD_REQUEST, "fields required"),
    };
    let id = format!("doc{:04}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    let path = format!("{collection}/{id}");
    let doc = StoredDocument {
        fields,
        create_time: Utc::now(),
    };
    let rendered = render_document(&project, &path, &doc);
    state.documents.lock().unwrap().insert(path, doc);
    (StatusCode::OK, Json(rendered))
}

async fn firestore_get(
    State(state): State<Arc<FirestoreState>>,
    Path((project, _database, collection, id)): DocPath,
    RawQuery(raw): RawQuery,
) -> Reply {
    if let Err(reply) = firestore_authorized(&project, &query_pairs(raw.as_deref())) {
        return reply;
    }
    let path = format!("{collection}/{id}");
    match state.documents.lock().unwrap().get(&path) {
        Some(doc) => (StatusCode::OK, Json(render_document(&project, &path, doc))),
        None => status_error(StatusCode::NOT_FOUND, "Document not found"),
    }
}

async fn firestore_patch(
    State(state): State<Arc<FirestoreState>>,
    Path((project, _database, collection, id)): DocPath,
    RawQuery(raw): RawQuery,
    Json(body): Json<Value>,
) -> Reply {
    let query = query_pairs(raw.as_deref());
    if let Err(reply) = firestore_authorized(&project, &query) {
        return reply;
    }
    let mask: Vec<String> = query
        .iter()
        .filter(|(key, _)| key == "updateMask.fieldPaths")
        .map(|(_, value)| value.clone())
        .collect();
    let must_exist = query
        .iter()
        .any(|(key, value)| key == "currentDocument.exists" && value == "true");
    state.patch_masks.lock().unwrap().push(mask.clone());

    let path = format!("{collection}/{id}");
    let mut documents = state.documents.lock().unwrap();
    if must_exist && !documents.contains_key(&path) {
        return status_error(StatusCode::NOT_FOUND, "No document to update");
    }
    let doc = documents.entry(path.clone()).or_insert_with(|| StoredDocument {
        fields: Map::new(),
        create_time: Utc::now(),
    });
    let incoming = body.get("fields").and_then(Value::as_object);
    for field in &mask {
        match incoming.and_then(|fields| fields.get(field)) {
            Some(value) => {
                let single = Map::from_iter([(field.clone(), value.clone())]);
                doc.fields.extend(to_stored_precision(single));
            }
            None => {
                doc.fields.remove(field);
            }
        }
    }
    (StatusCode::OK, Json(render_document(&project, &path, doc)))
}

async fn firestore_delete(
    State(state): State<Arc<FirestoreState>>,
    Path((project, _database, collection, id)): DocPath,
    RawQuery(raw): RawQuery,
) -> Reply {
    let query = query_pairs(raw.as_deref());
    if let Err(reply) = firestore_authorized(&project, &query) {
        return reply;
    }
    let must_exist = query
        .iter()
        .any(|(key, value)| key == "currentDocument.exists" && value == "true");
    let removed = state
        .documents
        .lock()
        .unwrap()
        .remove(&format!("{collection}/{id}"));
    if removed.is_none() && must_exist {
        return status_error(StatusCode::NOT_FOUND, "No document to delete");
    }
    (StatusCode::OK, Json(json!({})))
}

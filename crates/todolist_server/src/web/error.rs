//! Error-to-response mapping.
//!
//! Every failure body is `{"error": <message>, "code": <code>}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use todolist_core::TaskServiceError;

pub type ApiReply = (StatusCode, Json<Value>);

pub fn service_error(err: &TaskServiceError) -> ApiReply {
    let status = match err {
        TaskServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskServiceError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        // Backend details stay in the server log.
        TaskServiceError::Backend(_) => "storage backend failed".to_string(),
        other => other.to_string(),
    };
    (
        status,
        Json(json!({ "error": message, "code": err.code() })),
    )
}

pub fn bad_json(rejection: &JsonRejection) -> ApiReply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text(), "code": "validation" })),
    )
}

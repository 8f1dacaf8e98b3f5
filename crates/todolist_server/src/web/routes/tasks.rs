//! Task routes, mounted under `/tasks` and `/api/todos`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use todolist_core::{NewTask, RepoError, ServiceResult, TaskPatch, TaskServiceError};

use crate::web::error::{bad_json, service_error, ApiReply};
use crate::web::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/board", get(board))
        .route("/stats", get(stats))
        .route(
            "/{id}",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
}

fn reply<T: Serialize>(status: StatusCode, result: ServiceResult<T>) -> ApiReply {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => (status, Json(body)),
            Err(err) => service_error(&TaskServiceError::Backend(RepoError::Serialization(err))),
        },
        Err(err) => service_error(&err),
    }
}

async fn list_tasks(State(state): State<AppState>) -> ApiReply {
    reply(StatusCode::OK, state.service.list_tasks().await)
}

async fn board(State(state): State<AppState>) -> ApiReply {
    reply(StatusCode::OK, state.service.board().await)
}

async fn stats(State(state): State<AppState>) -> ApiReply {
    reply(StatusCode::OK, state.service.stats().await)
}

async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> ApiReply {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(&rejection),
    };
    reply(StatusCode::CREATED, state.service.create_task(input).await)
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiReply {
    reply(StatusCode::OK, state.service.get_task(&id).await)
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiReply {
    let Json(patch) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(&rejection),
    };
    reply(StatusCode::OK, state.service.update_task(&id, patch).await)
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiReply {
    reply(StatusCode::OK, state.service.delete_task(&id).await)
}

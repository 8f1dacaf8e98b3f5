//! Shared HTTP plumbing for remote backends.

use crate::config::BackendKind;
use crate::logging::sanitize_message;
use crate::repo::task_repo::{RepoError, RepoResult};
use reqwest::{Client, Response};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Builds the HTTP client shared by one remote repository.
pub(crate) fn build_client(timeout: Duration) -> RepoResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("todolist/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(RepoError::Transport)
}

/// Turns a non-success response into `RepoError::Remote`.
///
/// The response body is included (truncated) so remote error messages reach
/// the logs.
pub(crate) async fn ensure_success(backend: BackendKind, response: Response) -> RepoResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RepoError::Remote {
        backend,
        status: status.as_u16(),
        message: sanitize_message(body.trim(), MAX_ERROR_BODY_CHARS),
    })
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

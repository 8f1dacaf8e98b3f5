//! HTTP surface.
//!
//! # Responsibility
//! - Build the axum router over one injected `TaskService`.
//! - Apply the CORS policy resolved at startup.
//!
//! # Invariants
//! - Handlers hold no state of their own; everything flows through
//!   `AppState`.
//! - Task routes are served at both `/tasks` and `/api/todos`.

pub mod error;
pub mod routes;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use todolist_core::TaskService;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: TaskService,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(service: TaskService, cors_origins: Vec<String>) -> Self {
        Self {
            service,
            cors_origins,
        }
    }
}

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .merge(routes::health::router())
        .nest("/tasks", routes::tasks::router())
        .nest("/api/todos", routes::tasks::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(allow_origin)
}

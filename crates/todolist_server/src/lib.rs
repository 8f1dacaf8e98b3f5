//! HTTP server for the todolist service.
//!
//! # Responsibility
//! - Wire resolved settings, logging, the storage backend and the router
//!   into one running process.
//! - Stop accepting connections on Ctrl-C / SIGTERM and drain in-flight
//!   requests.

pub mod config;
pub mod web;

use config::{ServerSettings, SettingsError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use todolist_core::{open_repository, RepoError, TaskService};
use web::{build_router, AppState};

/// Startup and serve failures.
#[derive(Debug)]
pub enum ServerError {
    Settings(SettingsError),
    Logging(String),
    Storage(RepoError),
    Io(std::io::Error),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Settings(err) => write!(f, "invalid settings: {err}"),
            Self::Logging(message) => write!(f, "logging setup failed: {message}"),
            Self::Storage(err) => write!(f, "storage setup failed: {err}"),
            Self::Io(err) => write!(f, "server io failed: {err}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Settings(err) => Some(err),
            Self::Logging(_) => None,
            Self::Storage(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<SettingsError> for ServerError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<RepoError> for ServerError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Opens storage, binds the listener and serves until a shutdown signal.
///
/// Logging must already be initialized.
pub async fn run(settings: ServerSettings) -> Result<(), ServerError> {
    let repo = open_repository(&settings.store).await?;
    let service = TaskService::new(repo);
    if !service.backend().is_durable() {
        warn!(
            "event=server_start module=server status=degraded backend={} durable=false",
            service.backend()
        );
    }

    let app = build_router(AppState::new(service.clone(), settings.cors_origins.clone()));
    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "event=server_start module=server status=ok addr={} backend={} cors={}",
        listener.local_addr()?,
        service.backend(),
        settings.cors_origins.join(",")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("event=server_stop module=server status=ok");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("event=signal_install module=server status=error signal=ctrl_c error={err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(
                    "event=signal_install module=server status=error signal=sigterm error={err}"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("event=shutdown_signal module=server status=ok");
}

//! Core domain logic for the todolist service.
//! This crate is the single source of truth for task invariants and storage.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{BackendConfig, BackendKind, ConfigError, MemoryOptions, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::board::{TaskBoard, TaskStats};
pub use model::task::{NewTask, Priority, Task, TaskDraft, TaskId, TaskPatch, TaskValidationError};
pub use repo::open_repository;
pub use repo::task_repo::{RepoError, RepoResult, TaskRepository};
pub use service::task_service::{is_valid_task_id, ServiceResult, TaskService, TaskServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

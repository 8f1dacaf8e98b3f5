//! Task domain model and read-side projections.
//!
//! # Responsibility
//! - Define canonical data structures used by every storage backend.
//! - Keep create/patch normalization in one place.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod board;
pub mod task;

//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record shared by every storage backend.
//! - Own the create/patch rules so backends never re-implement them.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `title` is stored trimmed and is never empty.
//! - `completed_at.is_some() == completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a task.
///
/// Kept as a plain string because remote document stores assign their own
/// opaque ids.
pub type TaskId = String;

/// Task urgency, ordered `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// All priorities from least to most urgent.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    /// Stable wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Numeric rank used for sorting (`low = 1` .. `urgent = 4`).
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    /// Parses the wire string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain validation failures for task records and inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyId,
    EmptyTitle,
    UntrimmedTitle,
    EmptyDescription,
    CompletionMismatch { completed: bool },
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "task id must not be empty"),
            Self::EmptyTitle => write!(f, "title is required"),
            Self::UntrimmedTitle => write!(f, "title must not have surrounding whitespace"),
            Self::EmptyDescription => write!(f, "description must be absent instead of empty"),
            Self::CompletionMismatch { completed: true } => {
                write!(f, "completed task must carry completedAt")
            }
            Self::CompletionMismatch { completed: false } => {
                write!(f, "pending task must not carry completedAt")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Builds a pending task from a validated draft and an assigned id.
    pub fn from_draft(id: impl Into<TaskId>, draft: &TaskDraft) -> Self {
        Self {
            id: id.into(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
            completed: false,
            created_at: draft.created_at,
            completed_at: None,
        }
    }

    /// Generates a fresh random id for locally-assigned backends.
    pub fn generate_id() -> TaskId {
        Uuid::new_v4().to_string()
    }

    /// Checks record-level invariants.
    ///
    /// Runs on every write path and on every record read back from storage.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.trim().is_empty() {
            return Err(TaskValidationError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if self.title.trim() != self.title {
            return Err(TaskValidationError::UntrimmedTitle);
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                return Err(TaskValidationError::EmptyDescription);
            }
        }
        if self.completed != self.completed_at.is_some() {
            return Err(TaskValidationError::CompletionMismatch {
                completed: self.completed,
            });
        }
        Ok(())
    }

    /// Applies a partial update in place.
    ///
    /// Returns the list of wire field names that changed. On validation
    /// failure the task is left untouched.
    ///
    /// # Contract
    /// - Absent fields are kept.
    /// - `completed` flipping false -> true stamps `completed_at = now`
    ///   (never earlier than `created_at`); true -> false clears it.
    pub fn apply_patch(
        &mut self,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, TaskValidationError> {
        let title = match &patch.title {
            Some(raw) => Some(normalize_title(raw)?),
            None => None,
        };

        let mut changed = Vec::new();

        if let Some(title) = title {
            if title != self.title {
                self.title = title;
                changed.push("title");
            }
        }

        if let Some(description) = &patch.description {
            let description = normalize_description(description.as_deref());
            if description != self.description {
                self.description = description;
                changed.push("description");
            }
        }

        if let Some(priority) = patch.priority {
            if priority != self.priority {
                self.priority = priority;
                changed.push("priority");
            }
        }

        if let Some(completed) = patch.completed {
            if completed != self.completed {
                self.completed = completed;
                self.completed_at = completed.then(|| now.max(self.created_at));
                changed.push("completed");
                changed.push("completedAt");
            }
        }

        Ok(changed)
    }
}

/// Validated task input without an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl TaskDraft {
    /// Normalizes and validates client input.
    ///
    /// `created_at` is rounded up to whole microseconds, the finest
    /// precision every backend stores.
    ///
    /// # Errors
    /// - `EmptyTitle` when the title is blank after trimming.
    pub fn new(input: &NewTask, created_at: DateTime<Utc>) -> Result<Self, TaskValidationError> {
        Ok(Self {
            title: normalize_title(&input.title)?,
            description: normalize_description(input.description.as_deref()),
            priority: input.priority.unwrap_or_default(),
            created_at: ceil_to_micros(created_at),
        })
    }
}

fn ceil_to_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    let remainder = at.timestamp_subsec_nanos() % 1_000;
    if remainder == 0 {
        return at;
    }
    at + chrono::Duration::nanoseconds(i64::from(1_000 - remainder))
}

/// Create request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Partial update payload.
///
/// `description` distinguishes "absent" (`None`) from "clear" (`Some(None)`,
/// sent as JSON `null`). Unknown fields such as `id` or `createdAt` are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims a title and rejects blank input.
pub fn normalize_title(raw: &str) -> Result<String, TaskValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TaskValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Trims a description; blank input collapses to `None`.
pub fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

//! SQLite bootstrap for the sqlite task backend.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply schema migrations in deterministic order.
//! - Convert timestamps to and from their column representation.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Task rows are never touched before migrations succeed.
//! - Timestamp columns hold fixed-width RFC 3339 UTC text (nanosecond
//!   precision), so lexical order equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Io(err) => write!(f, "sqlite file setup failed: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Formats a timestamp for a TEXT column.
pub fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a TEXT column timestamp.
pub fn timestamp_from_db(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::{timestamp_from_db, timestamp_to_db};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn timestamps_are_fixed_width_and_lossless() {
        let whole = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let fractional = whole + Duration::nanoseconds(1_500);

        let whole_text = timestamp_to_db(whole);
        let fractional_text = timestamp_to_db(fractional);
        assert_eq!(whole_text, "2025-06-01T08:30:00.000000000Z");
        assert_eq!(whole_text.len(), fractional_text.len());
        assert!(whole_text < fractional_text);

        assert_eq!(timestamp_from_db(&fractional_text), Some(fractional));
        assert_eq!(timestamp_from_db("yesterday"), None);
    }
}

//! Storage backend configuration.
//!
//! # Responsibility
//! - Describe every supported backend and its parameters as one value.
//! - Resolve that value once at startup from environment variables.
//!
//! # Invariants
//! - Backend choice is fixed for the process lifetime; nothing here is
//!   consulted again after the repository is opened.
//! - An explicitly selected backend with missing parameters is an error, never
//!   a silent fallback to another backend.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_BACKEND: &str = "TODOLIST_BACKEND";
pub const ENV_DATA_FILE: &str = "TODOLIST_DATA_FILE";
pub const ENV_SQLITE_PATH: &str = "TODOLIST_SQLITE_PATH";
pub const ENV_MEMORY_SEED: &str = "TODOLIST_MEMORY_SEED";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TODOLIST_HTTP_TIMEOUT_SECS";
pub const ENV_FIREBASE_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const ENV_FIREBASE_API_KEY: &str = "FIREBASE_API_KEY";
pub const ENV_FIREBASE_COLLECTION: &str = "FIREBASE_COLLECTION";
pub const ENV_FIRESTORE_BASE_URL: &str = "FIRESTORE_BASE_URL";
pub const ENV_KV_URL: &str = "KV_REST_API_URL";
pub const ENV_KV_TOKEN: &str = "KV_REST_API_TOKEN";
pub const ENV_KV_KEY: &str = "KV_KEY";
pub const ENV_JSONBIN_API_KEY: &str = "JSONBIN_API_KEY";
pub const ENV_JSONBIN_BIN_ID: &str = "JSONBIN_BIN_ID";
pub const ENV_JSONBIN_BASE_URL: &str = "JSONBIN_BASE_URL";
pub const ENV_JSONBIN_CACHE_TTL_SECS: &str = "JSONBIN_CACHE_TTL_SECS";
pub const ENV_VERCEL: &str = "VERCEL";
pub const ENV_NODE_ENV: &str = "NODE_ENV";

pub const DEFAULT_DATA_FILE: &str = "data/todos.json";
pub const DEFAULT_SQLITE_PATH: &str = "data/todos.sqlite3";
pub const DEFAULT_COLLECTION: &str = "todos";
pub const DEFAULT_KV_KEY: &str = "todos";
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_JSONBIN_BASE_URL: &str = "https://api.jsonbin.io/v3";
pub const DEFAULT_JSONBIN_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend identity, independent of parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    File,
    Memory,
    Sqlite,
    Firestore,
    KeyValue,
    JsonBin,
}

impl BackendKind {
    /// Stable id used in configuration and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Firestore => "firestore",
            Self::KeyValue => "kv",
            Self::JsonBin => "jsonbin",
        }
    }

    /// Whether data survives a process restart.
    pub fn is_durable(self) -> bool {
        !matches!(self, Self::Memory)
    }

    /// Parses a backend id (case-insensitive, a few aliases accepted).
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "firestore" | "firebase" => Ok(Self::Firestore),
            "kv" | "redis" => Ok(Self::KeyValue),
            "jsonbin" => Ok(Self::JsonBin),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for the process-memory backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Start with two sample tasks instead of an empty list.
    pub seed_samples: bool,
}

/// One backend with all of its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    File {
        path: PathBuf,
    },
    Memory(MemoryOptions),
    Sqlite {
        path: PathBuf,
    },
    Firestore {
        project_id: String,
        api_key: Option<String>,
        collection: String,
        base_url: String,
    },
    KeyValue {
        url: String,
        token: String,
        key: String,
    },
    JsonBin {
        api_key: String,
        bin_id: String,
        base_url: String,
        cache_ttl: Duration,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::File { .. } => BackendKind::File,
            Self::Memory(_) => BackendKind::Memory,
            Self::Sqlite { .. } => BackendKind::Sqlite,
            Self::Firestore { .. } => BackendKind::Firestore,
            Self::KeyValue { .. } => BackendKind::KeyValue,
            Self::JsonBin { .. } => BackendKind::JsonBin,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryOptions::default())
    }
}

/// Full store configuration handed to `open_repository`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Request timeout for remote backends.
    pub http_timeout: Duration,
}

impl StoreConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Resolves configuration from an arbitrary variable lookup.
    ///
    /// # Selection
    /// - `TODOLIST_BACKEND` wins when set.
    /// - Otherwise deployment signals are checked in order: Firestore project,
    ///   KV endpoint + token, JSONBin key + bin, hosted/production marker
    ///   (memory), and finally the local file backend.
    ///
    /// # Errors
    /// - Unknown backend id or missing required parameter.
    /// - Unparseable numeric or boolean values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let kind = match get(ENV_BACKEND) {
            Some(value) => BackendKind::parse(&value)?,
            None => infer_kind(&get),
        };

        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVar(name));

        let backend = match kind {
            BackendKind::File => BackendConfig::File {
                path: PathBuf::from(
                    get(ENV_DATA_FILE).unwrap_or_else(|| DEFAULT_DATA_FILE.to_string()),
                ),
            },
            BackendKind::Memory => BackendConfig::Memory(MemoryOptions {
                seed_samples: match get(ENV_MEMORY_SEED) {
                    Some(value) => parse_bool(ENV_MEMORY_SEED, &value)?,
                    None => false,
                },
            }),
            BackendKind::Sqlite => BackendConfig::Sqlite {
                path: PathBuf::from(
                    get(ENV_SQLITE_PATH).unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string()),
                ),
            },
            BackendKind::Firestore => BackendConfig::Firestore {
                project_id: require(ENV_FIREBASE_PROJECT_ID)?,
                api_key: get(ENV_FIREBASE_API_KEY),
                collection: get(ENV_FIREBASE_COLLECTION)
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                base_url: get(ENV_FIRESTORE_BASE_URL)
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_string()),
            },
            BackendKind::KeyValue => BackendConfig::KeyValue {
                url: require(ENV_KV_URL)?,
                token: require(ENV_KV_TOKEN)?,
                key: get(ENV_KV_KEY).unwrap_or_else(|| DEFAULT_KV_KEY.to_string()),
            },
            BackendKind::JsonBin => BackendConfig::JsonBin {
                api_key: require(ENV_JSONBIN_API_KEY)?,
                bin_id: require(ENV_JSONBIN_BIN_ID)?,
                base_url: get(ENV_JSONBIN_BASE_URL)
                    .unwrap_or_else(|| DEFAULT_JSONBIN_BASE_URL.to_string()),
                cache_ttl: match get(ENV_JSONBIN_CACHE_TTL_SECS) {
                    Some(value) => parse_secs(ENV_JSONBIN_CACHE_TTL_SECS, &value)?,
                    None => DEFAULT_JSONBIN_CACHE_TTL,
                },
            },
        };

        let http_timeout = match get(ENV_HTTP_TIMEOUT_SECS) {
            Some(value) => parse_timeout_secs(ENV_HTTP_TIMEOUT_SECS, &value)?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        Ok(Self {
            backend,
            http_timeout,
        })
    }
}

fn infer_kind<F>(get: &F) -> BackendKind
where
    F: Fn(&str) -> Option<String>,
{
    if get(ENV_FIREBASE_PROJECT_ID).is_some() {
        return BackendKind::Firestore;
    }
    if get(ENV_KV_URL).is_some() && get(ENV_KV_TOKEN).is_some() {
        return BackendKind::KeyValue;
    }
    if get(ENV_JSONBIN_API_KEY).is_some() && get(ENV_JSONBIN_BIN_ID).is_some() {
        return BackendKind::JsonBin;
    }
    let hosted = get(ENV_VERCEL).is_some()
        || get(ENV_NODE_ENV).is_some_and(|value| value.eq_ignore_ascii_case("production"));
    if hosted {
        return BackendKind::Memory;
    }
    BackendKind::File
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

/// Like `parse_secs`, but zero is rejected: a zero timeout fails every request.
fn parse_timeout_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_secs(name, value)? {
        timeout if timeout.is_zero() => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
        timeout => Ok(timeout),
    }
}

/// Configuration resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownBackend(String),
    MissingVar(&'static str),
    InvalidValue { name: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownBackend(value) => write!(
                f,
                "unknown backend `{value}`; expected file|memory|sqlite|firestore|kv|jsonbin"
            ),
            Self::MissingVar(name) => write!(f, "missing required setting {name}"),
            Self::InvalidValue { name, value } => {
                write!(f, "invalid value `{value}` for {name}")
            }
        }
    }
}

impl Error for ConfigError {}

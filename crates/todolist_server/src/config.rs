//! Server settings resolution.
//!
//! # Responsibility
//! - Resolve listen address, CORS origins and logging options once at startup.
//! - Resolve the storage backend through `todolist_core::StoreConfig`.
//!
//! # Invariants
//! - Precedence per field: CLI flag > environment > settings file > default.
//! - A settings file that exists but cannot be parsed is an error, never
//!   silently ignored.

use clap::Parser;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use todolist_core::config::ENV_BACKEND;
use todolist_core::{default_log_level, ConfigError, StoreConfig};

pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 3000;

/// Command line for the `todolist-server` binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "todolist-server", version, about = "Todo list HTTP API")]
pub struct Cli {
    /// Address to bind
    #[arg(long = "host", env = "TODOLIST_LISTEN_HOST")]
    pub listen_host: Option<String>,

    /// Port to bind
    #[arg(long = "port", env = "TODOLIST_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Comma-separated allowed CORS origins, or `*`
    #[arg(long, env = "TODOLIST_CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, env = "TODOLIST_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rotating log files (stderr when unset)
    #[arg(long, env = "TODOLIST_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Storage backend: file|memory|sqlite|firestore|kv|jsonbin
    #[arg(long)]
    pub backend: Option<String>,

    /// Optional JSON settings file
    #[arg(long = "settings")]
    pub settings_file: Option<PathBuf>,
}

/// Settings file layout (camelCase JSON, every field optional).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
    pub cors_origins: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub listen_host: String,
    pub listen_port: u16,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub store: StoreConfig,
}

impl ServerSettings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Resolves settings from parsed CLI flags and the process environment.
    pub fn resolve(cli: Cli) -> Result<Self, SettingsError> {
        Self::resolve_with(cli, |name| std::env::var(name).ok())
    }

    /// Resolves settings with an explicit environment lookup for the store.
    pub fn resolve_with<F>(cli: Cli, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &cli.settings_file {
            Some(path) => read_settings_file(path)?,
            None => SettingsFile::default(),
        };

        let cors_origins = match cli.cors_origins.as_deref() {
            Some(raw) => parse_cors_origins(raw),
            None => file
                .cors_origins
                .map(|origins| parse_cors_origins(&origins.join(",")))
                .unwrap_or_else(|| vec!["*".to_string()]),
        };

        let backend_override = cli.backend.clone();
        let store = StoreConfig::from_lookup(|name| {
            if name == ENV_BACKEND {
                if let Some(backend) = &backend_override {
                    return Some(backend.clone());
                }
            }
            lookup(name)
        })?;

        Ok(Self {
            listen_host: cli
                .listen_host
                .or(file.listen_host)
                .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string()),
            listen_port: cli
                .listen_port
                .or(file.listen_port)
                .unwrap_or(DEFAULT_LISTEN_PORT),
            cors_origins,
            log_level: cli
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| default_log_level().to_string()),
            log_dir: cli.log_dir.or(file.log_dir).filter(|dir| !dir.trim().is_empty()),
            store,
        })
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile, SettingsError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SettingsFile::default());
        }
        Err(err) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    serde_json::from_str(&content).map_err(|err| SettingsError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

fn parse_cors_origins(raw: &str) -> Vec<String> {
    let entries: Vec<String> = raw
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();
    if entries.is_empty() || entries.iter().any(|entry| entry == "*") {
        return vec!["*".to_string()];
    }
    entries
}

#[derive(Debug)]
pub enum SettingsError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Store(ConfigError),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings file `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse settings file `{}`: {source}", path.display())
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SettingsError {
    fn from(value: ConfigError) -> Self {
        Self::Store(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_cors_origins, Cli, ServerSettings, SettingsError};
    use clap::Parser;
    use std::collections::HashMap;
    use todolist_core::{BackendConfig, BackendKind};

    fn resolve(cli: Cli, vars: &[(&str, &str)]) -> Result<ServerSettings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServerSettings::resolve_with(cli, |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let settings = resolve(Cli::default(), &[]).unwrap();
        assert_eq!(settings.listen_addr(), "127.0.0.1:3000");
        assert_eq!(settings.cors_origins, vec!["*"]);
        assert_eq!(settings.log_dir, None);
        assert_eq!(settings.store.backend, BackendConfig::file("data/todos.json"));
    }

    #[test]
    fn flags_win_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"listenHost":"0.0.0.0","listenPort":8080,"corsOrigins":["https://a.example"],"logLevel":"warn"}"#,
        )
        .unwrap();

        let cli = Cli {
            listen_port: Some(9000),
            settings_file: Some(path),
            ..Cli::default()
        };
        let settings = resolve(cli, &[]).unwrap();
        assert_eq!(settings.listen_host, "0.0.0.0");
        assert_eq!(settings.listen_port, 9000);
        assert_eq!(settings.cors_origins, vec!["https://a.example"]);
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn unparseable_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();

        let cli = Cli {
            settings_file: Some(path),
            ..Cli::default()
        };
        assert!(matches!(
            resolve(cli, &[]).unwrap_err(),
            SettingsError::Parse { .. }
        ));
    }

    #[test]
    fn backend_flag_overrides_environment() {
        let cli = Cli {
            backend: Some("memory".to_string()),
            ..Cli::default()
        };
        let settings = resolve(cli, &[("TODOLIST_BACKEND", "sqlite")]).unwrap();
        assert_eq!(settings.store.backend.kind(), BackendKind::Memory);

        let from_env = resolve(Cli::default(), &[("TODOLIST_BACKEND", "sqlite")]).unwrap();
        assert_eq!(from_env.store.backend.kind(), BackendKind::Sqlite);
    }

    #[test]
    fn cors_wildcard_collapses_list() {
        assert_eq!(parse_cors_origins("https://a, *"), vec!["*"]);
        assert_eq!(
            parse_cors_origins(" https://a ,https://b,"),
            vec!["https://a", "https://b"]
        );
        assert_eq!(parse_cors_origins(""), vec!["*"]);
    }

    #[test]
    fn cli_parses_long_flags() {
        let cli = Cli::try_parse_from([
            "todolist-server",
            "--host",
            "0.0.0.0",
            "--port",
            "8081",
            "--backend",
            "sqlite",
        ])
        .unwrap();
        assert_eq!(cli.listen_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.listen_port, Some(8081));
        assert_eq!(cli.backend.as_deref(), Some("sqlite"));
    }
}

//! Manager configuration loaded from TOML.
//!
//! # Responsibility
//! - Describe where the store lives and how sessions and logging behave.
//! - Parse configuration text; every field has a default.

use crate::db::{OpenOptions, SessionOptions};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings for [`crate::MetadataManager::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Database file; `None` keeps the store in memory.
    pub database: Option<PathBuf>,
    /// Isolate nested scopes in savepoints instead of sharing one transaction.
    pub nested_transactions: bool,
    pub busy_timeout_ms: u64,
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files.
    pub log_dir: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            database: None,
            nested_transactions: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_level: None,
            log_dir: None,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            nested_transactions: self.nested_transactions,
        }
    }
}

/// Configuration loading failure.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Serialize(err) => write!(f, "failed to encode config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Serialize(err) => Some(err),
        }
    }
}

/// Reads and parses a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<ManagerConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ManagerConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ManagerConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_text_yields_defaults() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(!config.nested_transactions);
    }

    #[test]
    fn partial_text_overrides_named_fields() {
        let config = ManagerConfig::from_toml_str(
            "database = \"/tmp/store.db\"\nnested_transactions = true\n",
        )
        .unwrap();
        assert_eq!(config.database, Some(PathBuf::from("/tmp/store.db")));
        assert!(config.session_options().nested_transactions);
        assert_eq!(config.open_options().busy_timeout.as_millis(), 5_000);
    }

    #[test]
    fn wrong_types_are_parse_errors() {
        let err = ManagerConfig::from_toml_str("busy_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

//! Bridge configuration
//!
//! Defaults: storage `SqliteStorage`, container `keyvaluepairs`, snapshot
//! key `sqlite_db_data`.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "sqlite_db_data";
pub const DEFAULT_CONTAINER: &str = "keyvaluepairs";
pub const DEFAULT_STORAGE_NAME: &str = "SqliteStorage";
pub const DEFAULT_WORKER_NAME: &str = "sqlbridge-worker";

/// Where snapshots are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Versioned SQLite key-value file
    Sqlite { path: PathBuf },
    /// Directory tree, one file per key
    Fs { dir: PathBuf },
    /// Process-local map; nothing survives the process
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: PathBuf::from(DEFAULT_STORAGE_NAME),
        }
    }
}

/// Retry policy for the post-mutation snapshot write
///
/// The default (one attempt) is log-and-continue: a failed save is reported
/// as a warning and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub backoff_ms: u64,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 50,
        }
    }
}

/// Top-level configuration of one execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Logical database name; also the snapshot key
    pub database: String,
    /// Logical container holding snapshot blobs
    pub container: String,
    pub storage: StorageConfig,
    pub persist: PersistPolicy,
    /// OS thread name of the worker
    pub worker_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
            storage: StorageConfig::default(),
            persist: PersistPolicy::default(),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a TOML document; absent keys take defaults
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let doc = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&doc)
    }

    /// In-memory storage; for tests and throwaway contexts
    pub fn ephemeral() -> Self {
        Self {
            storage: StorageConfig::Memory,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database",
                reason: "must not be empty".to_string(),
            });
        }
        if self.container.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "container",
                reason: "must not be empty".to_string(),
            });
        }
        if self.persist.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "persist.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.database, "sqlite_db_data");
        assert_eq!(config.container, "keyvaluepairs");
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                path: PathBuf::from("SqliteStorage")
            }
        );
        assert_eq!(config.persist.max_attempts, 1);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BridgeConfig::from_toml_str("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_parse_fs_storage_and_retry() {
        let config = BridgeConfig::from_toml_str(
            r#"
            database = "notes"

            [storage]
            kind = "fs"
            dir = "/var/lib/notes"

            [persist]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.database, "notes");
        assert_eq!(
            config.storage,
            StorageConfig::Fs {
                dir: PathBuf::from("/var/lib/notes")
            }
        );
        assert_eq!(config.persist.max_attempts, 3);
        assert_eq!(config.persist.backoff_ms, 50);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = BridgeConfig::from_toml_str("[persist]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "persist.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_storage_kind_rejected() {
        let err = BridgeConfig::from_toml_str("[storage]\nkind = \"indexeddb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nkind = \"memory\"").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load(Path::new("/nonexistent/sqlbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

//! Engine module loading
//!
//! The engine is consumed as an opaque component. Loading it means checking
//! that a usable SQLite library is linked and can open a database; the
//! resulting [`EngineModule`] is the only way to obtain engine handles.

use rusqlite::Connection;
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};

/// Oldest SQLite accepted by the loader
pub const MIN_SQLITE_VERSION: i32 = 3_024_000;

/// A loaded engine; hands out fresh in-memory handles
#[derive(Debug, Clone)]
pub struct EngineModule {
    version: String,
}

impl EngineModule {
    /// Library version string, e.g. `3.41.2`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Create a fresh, empty in-memory database handle
    pub fn open_handle(&self) -> Result<Connection> {
        Connection::open_in_memory().map_err(|e| {
            ExError::new(ExErrorKind::EngineUnavailable)
                .with_op("open_handle")
                .with_message(e.to_string())
        })
    }
}

/// Source of the engine module for one execution context
pub trait EngineLoader: Send {
    fn load(&self) -> Result<EngineModule>;
}

/// Loader for the SQLite library compiled into this binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSqlite;

impl EngineLoader for BundledSqlite {
    fn load(&self) -> Result<EngineModule> {
        let version_number = rusqlite::version_number();
        if version_number < MIN_SQLITE_VERSION {
            return Err(ExError::new(ExErrorKind::EngineUnavailable)
                .with_op("load_engine")
                .with_message(format!(
                    "SQLite {} is older than the minimum supported {}",
                    rusqlite::version(),
                    MIN_SQLITE_VERSION
                )));
        }

        let module = EngineModule {
            version: rusqlite::version().to_string(),
        };

        let probe = module.open_handle()?;
        probe
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| {
                ExError::new(ExErrorKind::EngineUnavailable)
                    .with_op("load_engine")
                    .with_message(format!("engine probe failed: {}", e))
            })?;

        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_engine_loads() {
        let module = BundledSqlite.load().unwrap();
        assert!(module.version().starts_with('3'));
    }

    #[test]
    fn test_handles_are_independent() {
        let module = BundledSqlite.load().unwrap();
        let a = module.open_handle().unwrap();
        let b = module.open_handle().unwrap();

        a.execute_batch("CREATE TABLE only_in_a(x)").unwrap();
        assert!(b.prepare("SELECT * FROM only_in_a").is_err());
    }
}

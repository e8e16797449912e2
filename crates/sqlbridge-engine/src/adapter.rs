//! Engine adapter
//!
//! Owns the single engine handle of an execution context and exposes the
//! handle primitives: open/init, exec, export, restore and close. The adapter
//! itself is not synchronized; the dispatcher reaches it only through one
//! async mutex, which is what serializes handle access.

use crate::loader::EngineModule;
use crate::value::{sql_to_json, Bindings};
use rusqlite::backup::Progress;
use rusqlite::{Batch, Connection, DatabaseName};
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::protocol::{Ack, ExecResult};
use sqlbridge_store::snapshot::snapshot_digest;
use sqlbridge_store::SnapshotStore;
use std::io::Write;

/// Every non-empty database image starts with this header string
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// How a handle came to be open
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenOutcome {
    /// The stored snapshot was applied to the new handle
    pub restored: bool,
    /// The handle started empty because the snapshot was unusable
    pub warning: Option<String>,
}

impl OpenOutcome {
    fn fresh() -> Self {
        Self::default()
    }

    fn restored() -> Self {
        Self {
            restored: true,
            warning: None,
        }
    }

    fn fallback(warning: String) -> Self {
        Self {
            restored: false,
            warning: Some(warning),
        }
    }
}

impl From<OpenOutcome> for Ack {
    fn from(outcome: OpenOutcome) -> Self {
        match outcome.warning {
            Some(warning) => Ack::with_warning(warning),
            None => Ack::ok(),
        }
    }
}

pub struct EngineAdapter {
    module: EngineModule,
    store: SnapshotStore,
    default_database: String,
    database: String,
    handle: Option<Connection>,
}

impl EngineAdapter {
    /// Create an adapter with no open handle
    ///
    /// `database` is the logical name used as the snapshot key until an
    /// `open` selects another one.
    pub fn new(module: EngineModule, store: SnapshotStore, database: impl Into<String>) -> Self {
        let database = database.into();
        Self {
            module,
            store,
            default_database: database.clone(),
            database,
            handle: None,
        }
    }

    /// Logical name of the current database (the snapshot key)
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the handle for the current database, restoring its snapshot
    ///
    /// A no-op when a handle is already open.
    pub async fn init(&mut self) -> Result<OpenOutcome> {
        if self.handle.is_some() {
            return Ok(OpenOutcome::fresh());
        }
        self.bootstrap_handle().await
    }

    /// Select the logical database `path` (or the configured default) and
    /// open a handle for it, replacing any handle already open
    pub async fn open(&mut self, path: Option<&str>) -> Result<OpenOutcome> {
        let database = match path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => self.default_database.clone(),
        };

        if self.handle.is_some() {
            tracing::debug!(
                from = %self.database,
                to = %database,
                "replacing open handle"
            );
            self.close();
        }

        self.database = database;
        self.bootstrap_handle().await
    }

    /// Run `sql` against the open handle
    ///
    /// `args` bind to the first statement that declares parameters; every
    /// other statement runs with its parameters unbound (NULL), and args are
    /// ignored when no statement declares any. Rows of every statement are
    /// collected in order; `columns` names the first statement that has any.
    pub fn exec(&self, sql: &str, args: Option<&serde_json::Value>) -> Result<ExecResult> {
        let conn = self.connection("exec")?;
        let mut bindings = Bindings::from_json(args);
        let mut result = ExecResult::default();
        let mut wrote = false;

        let mut batch = Batch::new(conn, sql);
        while let Some(mut stmt) = batch.next().map_err(engine_error)? {
            if stmt.parameter_count() > 0 {
                std::mem::replace(&mut bindings, Bindings::None)
                    .bind(&mut stmt)
                    .map_err(engine_error)?;
            }

            if result.columns.is_empty() {
                result.columns = stmt.column_names().into_iter().map(String::from).collect();
            }
            let column_count = stmt.column_count();
            wrote |= !stmt.readonly();

            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next().map_err(engine_error)? {
                let mut cells = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    cells.push(sql_to_json(row.get_ref(i).map_err(engine_error)?));
                }
                result.rows.push(cells);
            }
        }

        if wrote {
            result.changes = conn.changes() as u64;
        }
        result.last_insert_rowid = conn.last_insert_rowid();
        Ok(result)
    }

    /// Serialize the open database to its file image
    pub fn export(&self) -> Result<Vec<u8>> {
        let conn = self.connection("export")?;
        let dir = tempfile::TempDir::new().map_err(|e| io_failure("export", e))?;
        let path = dir.path().join("export.sqlite");

        conn.backup(DatabaseName::Main, &path, None)
            .map_err(|e| {
                ExError::new(ExErrorKind::EngineExecution)
                    .with_op("export")
                    .with_message(e.to_string())
            })?;

        std::fs::read(&path).map_err(|e| io_failure("export", e))
    }

    /// Replace the open database with the image in `blob`
    ///
    /// The image is applied to a scratch handle first; the live handle is
    /// swapped only once that succeeds, so a corrupt image leaves it as it
    /// was.
    pub fn restore(&mut self, blob: &[u8]) -> Result<()> {
        self.connection("import")?;
        let restored = restore_into(&self.module, blob)?;
        self.handle = Some(restored);
        Ok(())
    }

    /// Export the open database and save it under the current key
    pub async fn persist(&self) -> Result<()> {
        let blob = self.export()?;
        tracing::debug!(
            database = %self.database,
            size_bytes = blob.len(),
            digest = %snapshot_digest(&blob),
            "persisting snapshot"
        );
        self.store.save(&self.database, blob).await
    }

    /// Release the handle; `false` when none was open
    pub fn close(&mut self) -> bool {
        match self.handle.take() {
            Some(conn) => {
                if let Err((_, err)) = conn.close() {
                    tracing::warn!(database = %self.database, error = %err, "engine handle closed with error");
                }
                true
            }
            None => false,
        }
    }

    fn connection(&self, op: &str) -> Result<&Connection> {
        self.handle.as_ref().ok_or_else(|| {
            ExError::new(ExErrorKind::NotInitialized)
                .with_op(op)
                .with_message("Database not initialized")
        })
    }

    /// Create the handle, restoring the stored snapshot when there is one
    ///
    /// An unreadable or corrupt snapshot does not fail the open: the handle
    /// starts empty and the outcome carries a warning.
    async fn bootstrap_handle(&mut self) -> Result<OpenOutcome> {
        let (conn, outcome) = match self.store.load(&self.database).await {
            Ok(None) => (self.module.open_handle()?, OpenOutcome::fresh()),
            Ok(Some(blob)) => match restore_into(&self.module, &blob) {
                Ok(conn) => (conn, OpenOutcome::restored()),
                Err(err) => {
                    tracing::warn!(
                        database = %self.database,
                        size_bytes = blob.len(),
                        error = %err,
                        "stored snapshot is corrupt, starting with an empty database"
                    );
                    (
                        self.module.open_handle()?,
                        OpenOutcome::fallback(format!(
                            "snapshot for '{}' could not be restored: {}",
                            self.database,
                            err.message()
                        )),
                    )
                }
            },
            Err(err) => {
                tracing::warn!(
                    database = %self.database,
                    error = %err,
                    "snapshot could not be loaded, starting with an empty database"
                );
                (
                    self.module.open_handle()?,
                    OpenOutcome::fallback(format!(
                        "snapshot for '{}' could not be loaded: {}",
                        self.database, err
                    )),
                )
            }
        };

        self.handle = Some(conn);
        Ok(outcome)
    }
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("engine", &self.module.version())
            .field("database", &self.database)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Build a fresh handle holding the database image `blob`
///
/// An empty blob is the image of an empty database.
fn restore_into(module: &EngineModule, blob: &[u8]) -> Result<Connection> {
    let mut conn = module.open_handle()?;
    if blob.is_empty() {
        return Ok(conn);
    }
    if blob.len() < 100 || !blob.starts_with(SQLITE_HEADER) {
        return Err(corrupt("not a SQLite database image"));
    }

    // In-memory destinations refuse a backup whose page size differs
    let page_size = match u16::from_be_bytes([blob[16], blob[17]]) {
        1 => 65_536,
        n => u32::from(n),
    };
    conn.pragma_update(None, "page_size", page_size)
        .map_err(|e| corrupt(e.to_string()))?;

    let mut file = tempfile::NamedTempFile::new().map_err(|e| io_failure("import", e))?;
    file.write_all(blob)
        .and_then(|()| file.flush())
        .map_err(|e| io_failure("import", e))?;

    conn.restore(DatabaseName::Main, file.path(), None::<fn(Progress)>)
        .map_err(|e| corrupt(e.to_string()))?;

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| corrupt(e.to_string()))?;
    if check != "ok" {
        return Err(corrupt(format!("integrity check failed: {}", check)));
    }

    Ok(conn)
}

fn engine_error(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::EngineExecution)
        .with_op("exec")
        .with_message(err.to_string())
}

fn corrupt(reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::RestoreCorrupt)
        .with_op("import")
        .with_message(reason)
}

fn io_failure(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(op)
        .with_message(err.to_string())
}

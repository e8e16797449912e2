//! Versioned SQLite key-value file
//!
//! Each container is a table `(key TEXT PRIMARY KEY, value BLOB, updated_at)`.
//! The file's `user_version` records the layout version; files stamped by a
//! newer layout are refused rather than misread.
//!
//! Every call opens its own connection on the blocking pool and closes it
//! before returning, on success and failure alike.

use crate::errors::{from_rusqlite, join_error, storage_error, Result};
use crate::kv::KvBackend;
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// Layout version written to `PRAGMA user_version`
pub const STORAGE_VERSION: i32 = 1;

#[derive(Debug, Clone)]
pub struct SqliteKv {
    path: PathBuf,
}

impl SqliteKv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KvBackend for SqliteKv {
    async fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path.clone();
        let container = container.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || get_blocking(&path, &container, &key))
            .await
            .map_err(|e| join_error("sqlite_kv_get", e))?
    }

    async fn put(&self, container: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path.clone();
        let container = container.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || put_blocking(&path, &container, &key, &value))
            .await
            .map_err(|e| join_error("sqlite_kv_put", e))?
    }
}

fn get_blocking(path: &Path, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| from_rusqlite("sqlite_kv_open", e))?;
    let result = read_slot(&conn, container, key);
    close(conn)?;
    result
}

fn read_slot(conn: &Connection, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
    check_version(conn)?;
    if !container_exists(conn, container)? {
        return Ok(None);
    }

    conn.query_row(
        &format!("SELECT value FROM {} WHERE key = ?1", quote_ident(container)),
        [key],
        |row| row.get::<_, Vec<u8>>(0),
    )
    .optional()
    .map_err(|e| from_rusqlite("sqlite_kv_get", e))
}

fn put_blocking(path: &Path, container: &str, key: &str, value: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| storage_error("sqlite_kv_open", e.to_string()))?;
    }

    let mut conn = Connection::open(path).map_err(|e| from_rusqlite("sqlite_kv_open", e))?;
    let result = write_slot(&mut conn, container, key, value);
    close(conn)?;
    result
}

fn write_slot(conn: &mut Connection, container: &str, key: &str, value: &[u8]) -> Result<()> {
    let version = check_version(conn)?;

    let tx = conn
        .transaction()
        .map_err(|e| from_rusqlite("sqlite_kv_put", e))?;

    if version < STORAGE_VERSION {
        tx.execute_batch(&format!("PRAGMA user_version = {}", STORAGE_VERSION))
            .map_err(|e| from_rusqlite("sqlite_kv_upgrade", e))?;
    }

    if !container_exists(&tx, container)? {
        tracing::debug!(container, "creating snapshot container");
        tx.execute_batch(&format!(
            "CREATE TABLE {} (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            quote_ident(container)
        ))
        .map_err(|e| from_rusqlite("sqlite_kv_create_container", e))?;
    }

    let now = chrono::Utc::now().timestamp_millis();
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)",
            quote_ident(container)
        ),
        rusqlite::params![key, value, now],
    )
    .map_err(|e| from_rusqlite("sqlite_kv_put", e))?;

    tx.commit().map_err(|e| from_rusqlite("sqlite_kv_commit", e))
}

fn check_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| from_rusqlite("sqlite_kv_version", e))?;
    if version > STORAGE_VERSION {
        return Err(storage_error(
            "sqlite_kv_version",
            format!(
                "storage layout version {} is newer than supported version {}",
                version, STORAGE_VERSION
            ),
        ));
    }
    Ok(version)
}

fn container_exists(conn: &Connection, container: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [container],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| from_rusqlite("sqlite_kv_container", e))
}

fn close(conn: Connection) -> Result<()> {
    conn.close()
        .map_err(|(_, e)| from_rusqlite("sqlite_kv_close", e))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::errors::ExErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_none_without_creating_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SqliteStorage");
        let kv = SqliteKv::new(&path);

        assert_eq!(kv.get("keyvaluepairs", "db").await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_put_stamps_layout_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SqliteStorage");
        let kv = SqliteKv::new(&path);

        kv.put("keyvaluepairs", "db", vec![1, 2, 3]).await.unwrap();

        let conn = Connection::open(&path).unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, STORAGE_VERSION);
    }

    #[tokio::test]
    async fn test_missing_container_in_existing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let kv = SqliteKv::new(dir.path().join("SqliteStorage"));

        kv.put("keyvaluepairs", "db", vec![1]).await.unwrap();

        assert_eq!(kv.get("other", "db").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_newer_layout_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SqliteStorage");
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 99")
            .unwrap();
        let kv = SqliteKv::new(&path);

        let err = kv.put("keyvaluepairs", "db", vec![1]).await.unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Storage);
        assert!(err.to_string().contains("newer than supported"));

        let err = kv.get("keyvaluepairs", "db").await.unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_quoted_container_names() {
        let dir = TempDir::new().unwrap();
        let kv = SqliteKv::new(dir.path().join("SqliteStorage"));

        kv.put("my \"odd\" store", "k", vec![9]).await.unwrap();
        assert_eq!(kv.get("my \"odd\" store", "k").await.unwrap(), Some(vec![9]));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("kv"), "\"kv\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}

//! Key-value backends for snapshot blobs
//!
//! A backend stores opaque blobs under `(container, key)`. `get` answers
//! `Ok(None)` both for a missing key and for a container that was never
//! created; only genuine storage failures are errors.

mod atomic;
mod fs;
mod memory;
mod sqlite;

pub use fs::FsKv;
pub use memory::MemoryKv;
pub use sqlite::{SqliteKv, STORAGE_VERSION};

use crate::errors::Result;
use async_trait::async_trait;
use sqlbridge_core::config::StorageConfig;
use std::sync::Arc;

/// Asynchronous, overwrite-by-key blob storage
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch the blob stored under `key`, if any
    async fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any prior value; creates the
    /// container on first use
    async fn put(&self, container: &str, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Build the backend named by the storage config
pub fn open_backend(config: &StorageConfig) -> Arc<dyn KvBackend> {
    match config {
        StorageConfig::Sqlite { path } => Arc::new(SqliteKv::new(path)),
        StorageConfig::Fs { dir } => Arc::new(FsKv::new(dir)),
        StorageConfig::Memory => Arc::new(MemoryKv::new()),
    }
}

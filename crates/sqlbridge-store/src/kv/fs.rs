//! Directory-backed key-value store
//!
//! Layout: `<root>/<container>/<hex(key)>.bin`. Keys are hex-encoded so any
//! database name (including paths) maps to one flat file name.

use crate::errors::{io_error, join_error, storage_error, Result};
use crate::kv::atomic::atomic_write;
use crate::kv::KvBackend;
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Filesystem key-value store with atomic overwrite
#[derive(Debug, Clone)]
pub struct FsKv {
    root: PathBuf,
}

impl FsKv {
    /// Create a store rooted at `root`; nothing is created until the first put
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, container: &str, key: &str) -> Result<PathBuf> {
        if container.is_empty()
            || container.contains(['/', '\\'])
            || container == "."
            || container == ".."
        {
            return Err(storage_error(
                "fs_kv_path",
                format!("invalid container name '{}'", container),
            ));
        }
        Ok(self
            .root
            .join(container)
            .join(format!("{}.bin", hex::encode(key.as_bytes()))))
    }
}

#[async_trait]
impl KvBackend for FsKv {
    async fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(container, key)?;
        tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            // covers both a missing key and a missing container directory
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("fs_kv_get", e)),
        })
        .await
        .map_err(|e| join_error("fs_kv_get", e))?
    }

    async fn put(&self, container: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.slot_path(container, key)?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &value))
            .await
            .map_err(|e| join_error("fs_kv_put", e))?
    }
}

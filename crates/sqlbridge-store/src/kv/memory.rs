//! In-process key-value store
//!
//! Nothing survives the process. Reads and writes can be switched to fail,
//! which lets hosts and tests exercise the degraded persistence paths.

use crate::errors::{storage_error, Result};
use crate::kv::KvBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type Containers = HashMap<String, HashMap<String, Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MemoryKv {
    containers: Mutex<Containers>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail until switched back
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put` fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful puts so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Read a slot without going through the async trait
    pub fn peek(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(container)
            .and_then(|slots| slots.get(key))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(storage_error("memory_kv_get", "simulated read failure"));
        }
        Ok(self.peek(container, key))
    }

    async fn put(&self, container: &str, key: &str, value: Vec<u8>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(storage_error("memory_kv_put", "simulated write failure"));
        }
        self.lock()
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overwrite_keeps_one_slot() {
        let kv = MemoryKv::new();
        kv.put("c", "k", vec![1]).await.unwrap();
        kv.put("c", "k", vec![2, 2]).await.unwrap();

        assert_eq!(kv.get("c", "k").await.unwrap(), Some(vec![2, 2]));
        assert_eq!(kv.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let kv = MemoryKv::new();
        kv.set_fail_writes(true);
        assert!(kv.put("c", "k", vec![1]).await.is_err());
        assert_eq!(kv.write_count(), 0);

        kv.set_fail_writes(false);
        kv.put("c", "k", vec![1]).await.unwrap();

        kv.set_fail_reads(true);
        assert!(kv.get("c", "k").await.is_err());
    }
}

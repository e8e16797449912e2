//! Durable snapshot store
//!
//! One binary database image per logical key, kept in a single named
//! container of a [`KvBackend`]. Every save overwrites the slot; no history
//! is retained.

use crate::errors::Result;
use crate::kv::{open_backend, KvBackend};
use sha2::{Digest, Sha256};
use sqlbridge_core::config::{BridgeConfig, PersistPolicy};
use sqlbridge_core::errors::{ExError, ExErrorKind};
use sqlbridge_core::{log_op_end, log_op_error, log_op_start};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn KvBackend>,
    container: String,
    policy: PersistPolicy,
}

impl SnapshotStore {
    /// Wrap a backend; saves are attempted once until a policy is set
    pub fn new(backend: Arc<dyn KvBackend>, container: impl Into<String>) -> Self {
        Self {
            backend,
            container: container.into(),
            policy: PersistPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PersistPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the store described by a bridge config
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(open_backend(&config.storage), config.container.clone())
            .with_policy(config.persist)
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Persist `blob` as the new image for `key`
    ///
    /// Resolves once the backend has committed the write. With a retry policy
    /// of more than one attempt, failed writes are retried after an
    /// exponentially growing delay; the error of the final attempt is
    /// attached as the source of the returned error.
    pub async fn save(&self, key: &str, mut blob: Vec<u8>) -> Result<()> {
        let start = Instant::now();
        let size_bytes = blob.len();
        log_op_start!("snapshot_save", database = key, size_bytes = size_bytes);

        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.policy.backoff_ms);
        let mut attempt = 1;

        loop {
            let payload = if attempt < max_attempts {
                blob.clone()
            } else {
                std::mem::take(&mut blob)
            };

            match self.backend.put(&self.container, key, payload).await {
                Ok(()) => {
                    log_op_end!(
                        "snapshot_save",
                        duration_ms = start.elapsed().as_millis() as u64,
                        database = key,
                        size_bytes = size_bytes,
                        attempts = attempt,
                    );
                    return Ok(());
                }
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        database = key,
                        attempt,
                        max_attempts,
                        error = %err,
                        "snapshot save failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    let err = ExError::new(ExErrorKind::Storage)
                        .with_op("snapshot_save")
                        .with_message(format!(
                            "could not persist '{}' after {} attempt(s)",
                            key, attempt
                        ))
                        .with_source(err);
                    log_op_error!(
                        "snapshot_save",
                        err,
                        duration_ms = start.elapsed().as_millis() as u64
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Fetch the image stored for `key`
    ///
    /// `Ok(None)` when nothing was ever saved, including when the container
    /// itself does not exist yet.
    pub async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        log_op_start!("snapshot_load", database = key);

        match self.backend.get(&self.container, key).await {
            Ok(found) => {
                log_op_end!(
                    "snapshot_load",
                    duration_ms = start.elapsed().as_millis() as u64,
                    database = key,
                    found = found.is_some(),
                    size_bytes = found.as_ref().map(|b| b.len()).unwrap_or(0),
                );
                Ok(found)
            }
            Err(err) => {
                let err = ExError::new(ExErrorKind::Storage)
                    .with_op("snapshot_load")
                    .with_message(format!("could not read '{}'", key))
                    .with_source(err);
                log_op_error!(
                    "snapshot_load",
                    err,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("container", &self.container)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// SHA256 digest of a snapshot image (hex-encoded, 64 characters)
pub fn snapshot_digest(blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blob);
    hex::encode(hasher.finalize())
}

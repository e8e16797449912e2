//! SQLBridge Store - Durable snapshot persistence
//!
//! Provides:
//! - A narrow async key-value trait (`get`/`put`) over interchangeable backends
//! - A versioned SQLite key-value file, an atomic-write directory store and
//!   an in-memory map
//! - `SnapshotStore`: one binary database image per logical key, with an
//!   optional bounded retry on save

pub mod errors;
pub mod kv;
pub mod snapshot;

// Re-export key types
pub use errors::Result;
pub use kv::{open_backend, FsKv, KvBackend, MemoryKv, SqliteKv};
pub use snapshot::SnapshotStore;

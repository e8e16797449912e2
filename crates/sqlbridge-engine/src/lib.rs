//! SQLBridge Engine - the isolated execution context
//!
//! Runs an embedded SQLite engine on a dedicated worker thread and exposes it
//! through the tagged request/response protocol of `sqlbridge_core::protocol`.
//!
//! Layering, leaf-first:
//! - `loader`: loads the engine module once per context
//! - `adapter`: owns the single engine handle (open/exec/export/restore/close)
//! - `degraded`: stand-in used when the engine cannot be loaded
//! - `dispatcher`: routes requests, persists snapshots after mutations
//! - `worker`: the execution context (thread + single-threaded runtime)
//! - `client`: id-correlating caller side of the message channel

pub mod adapter;
pub mod client;
pub mod degraded;
pub mod dispatcher;
pub mod loader;
pub mod value;
pub mod worker;

pub use adapter::{EngineAdapter, OpenOutcome};
pub use client::BridgeClient;
pub use degraded::DegradedFacade;
pub use dispatcher::{Backend, Dispatcher};
pub use loader::{BundledSqlite, EngineLoader, EngineModule};
pub use worker::{Worker, WorkerHandle, WorkerPort};

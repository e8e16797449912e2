//! Core types shared across SQLBridge facilities
//!
//! This crate provides foundational types used by the protocol, error
//! handling and logging facilities:
//!
//! - **Correlation types**: RequestId, ContextId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{ContextId, RequestId};

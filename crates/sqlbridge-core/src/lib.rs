//! SQLBridge Core
//!
//! Shared facilities for the isolated-context database bridge:
//!
//! - `errors`: canonical error taxonomy with stable codes
//! - `protocol`: tagged request/response messages crossing the context boundary
//! - `config`: bridge configuration (TOML-loadable)
//! - `logging_facility`: structured logging init, macros and test capture

pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod protocol;

pub use sqlbridge_core_types::schema;

//! Error handling for sqlbridge-store
//!
//! Every storage-layer failure surfaces as `ExErrorKind::Storage`; the
//! underlying cause is kept as the source or message.

use sqlbridge_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a storage error with a free-form reason
pub fn storage_error(op: &str, reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Storage)
        .with_op(op.to_string())
        .with_message(reason)
}

/// Create a storage error from rusqlite::Error
pub fn from_rusqlite(op: &str, err: rusqlite::Error) -> ExError {
    storage_error(op, err.to_string())
}

/// Create a storage error from an IO error
pub fn io_error(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Storage)
        .with_op(op.to_string())
        .with_source(
            ExError::new(ExErrorKind::Io)
                .with_op(op.to_string())
                .with_message(err.to_string()),
        )
}

/// Create an error for a blocking storage task that panicked or was cancelled
pub fn join_error(op: &str, err: tokio::task::JoinError) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(op.to_string())
        .with_message(format!("storage task failed: {}", err))
}

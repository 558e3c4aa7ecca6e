//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
///
/// The relay treats these as transient: the operation is logged and dropped
/// from the client's perspective (a failed send never appears, a failed
/// delete silently no-ops). Room deletion is the exception and surfaces a
/// visible error to the requester.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

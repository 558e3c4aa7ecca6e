//! Server error types.

use huddle_core::StorageError;
use thiserror::Error;

/// Errors that can occur in the server runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unwritable data dir).
    ///
    /// Fatal: fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, I/O error).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Storage backend failed to open or initialize.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

//! Storage error type.

use mandrake_core::{ErrorKind, MandrakeError};
use thiserror::Error;

/// Errors from the storage engine. I/O, integrity, and schema failures all
/// collapse into [`ErrorKind::Storage`] at the coordinator boundary; the
/// `NotFound` variant maps to [`ErrorKind::NotFound`] instead, since
/// "session does not exist" is a caller-correctable condition, not a
/// storage fault.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StorageError {
    /// No row exists for the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying SQLite engine reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A mutation violated a data-model invariant (e.g. round index gap).
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StorageError> for MandrakeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(ref msg) => {
                MandrakeError::new(ErrorKind::NotFound, msg.clone()).with_cause(err)
            }
            other => MandrakeError::new(ErrorKind::Storage, other.to_string()).with_cause(other),
        }
    }
}

//! The Service Registry's own error type, for failures that happen before
//! a workspace's resources exist to report a richer one.

use std::fmt;

use mandrake_core::{ErrorKind, MandrakeError};

/// Failure modes specific to registry bookkeeping.
#[derive(Debug)]
pub enum RegistryError {
    /// `getWorkspaceResources` was asked to open a workspace whose storage
    /// failed to open.
    Storage(mandrake_storage::StorageError),
    /// A session coordinator was requested for a workspace that has no
    /// cached resources and no `path` was supplied to create them.
    UnknownWorkspace(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Storage(e) => write!(f, "{e}"),
            RegistryError::UnknownWorkspace(id) => {
                write!(f, "workspace {id} has no cached resources and no path was given")
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Storage(e) => Some(e),
            RegistryError::UnknownWorkspace(_) => None,
        }
    }
}

impl From<mandrake_storage::StorageError> for RegistryError {
    fn from(e: mandrake_storage::StorageError) -> Self {
        RegistryError::Storage(e)
    }
}

impl From<RegistryError> for MandrakeError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Storage(e) => e.into(),
            RegistryError::UnknownWorkspace(msg) => MandrakeError::new(ErrorKind::NotFound, msg),
        }
    }
}

//! Error types for the registry crate.

use quill_storage::StorageError;
use quill_sync::SyncError;
use quill_types::{ErrorKind, TransitionError};
use thiserror::Error;

/// Errors that can occur in contributor registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The actor lacks the role or status for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The user already has a live contributor record on the proposal.
    #[error("user '{user}' is already a contributor of {proposal}")]
    DuplicateContributor { user: String, proposal: String },

    /// Invalid input or operation.
    #[error("invalid: {0}")]
    Validation(String),

    /// Invalid state transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Outbox staging error.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl RegistryError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::DuplicateContributor { .. } => ErrorKind::DuplicateContributor,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transition(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Sync(e) => e.kind(),
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

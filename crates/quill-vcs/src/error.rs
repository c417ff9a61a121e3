//! Error types for the version control engine.

use quill_registry::RegistryError;
use quill_storage::StorageError;
use quill_sync::SyncError;
use quill_types::{ErrorKind, TransitionError};
use thiserror::Error;

use crate::ConflictRegion;

/// Errors that can occur in version control operations.
#[derive(Debug, Error)]
pub enum VcsError {
    /// A proposal, commit or blob was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The actor may not perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Content must not be empty.
    #[error("content must not be empty")]
    EmptyContent,

    /// Invalid input or operation.
    #[error("invalid: {0}")]
    Validation(String),

    /// Both sides changed the same region.
    #[error("merge conflict in {} region(s)", regions.len())]
    MergeConflict { regions: Vec<ConflictRegion> },

    /// The operation was cancelled before anything was written.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Contributor registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Outbox staging error.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl VcsError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::BranchNotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::EmptyContent | Self::Validation(_) => ErrorKind::Validation,
            Self::MergeConflict { .. } => ErrorKind::MergeConflict,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Transition(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Sync(e) => e.kind(),
        }
    }
}

/// Result type for version control operations.
pub type Result<T> = std::result::Result<T, VcsError>;

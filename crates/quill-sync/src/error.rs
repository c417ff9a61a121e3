//! Synchronization error types.

use quill_storage::StorageError;
use quill_types::ErrorKind;
use thiserror::Error;

/// Errors raised while staging or delivering publish snapshots.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transient delivery failure; the call may be retried.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The index rejected the payload; retrying cannot help.
    #[error("rejected by search index: {0}")]
    Schema(String),

    /// Proposal not found.
    #[error("proposal not found: {0}")]
    NotFound(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Delivery(_) => ErrorKind::SyncDelivery,
            Self::Schema(_) | Self::Serialization(_) => ErrorKind::SyncSchema,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(e) => e.kind(),
        }
    }
}

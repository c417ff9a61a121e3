//! Storage error types.

use quill_types::{ErrorKind, ObjectId};
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A branch head changed between read and write.
    #[error("branch {branch} moved: expected {expected}, found {actual}")]
    HeadMoved {
        branch: String,
        expected: String,
        actual: String,
    },

    /// A record that must be unique already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A corruption was detected.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Invalid pagination cursor.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Builds a [`StorageError::HeadMoved`].
    pub fn head_moved(branch: impl ToString, expected: Option<ObjectId>, actual: Option<ObjectId>) -> Self {
        let show = |id: Option<ObjectId>| id.map_or_else(|| "<none>".to_string(), |id| id.short());
        Self::HeadMoved {
            branch: branch.to_string(),
            expected: show(expected),
            actual: show(actual),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCursor(_) => ErrorKind::Validation,
            Self::HeadMoved { .. }
            | Self::AlreadyExists(_)
            | Self::Corruption(_)
            | Self::Serialization(_) => ErrorKind::Storage,
        }
    }
}

//! Error types for pull request operations.

use quill_registry::RegistryError;
use quill_storage::StorageError;
use quill_sync::SyncError;
use quill_types::{ErrorKind, TransitionError};
use quill_vcs::{ConflictRegion, VcsError};
use thiserror::Error;

/// Errors that can occur during pull request operations.
#[derive(Debug, Error)]
pub enum CollaborationError {
    /// Pull request, proposal or branch not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The actor may not perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// `main` moved since the pull request was opened.
    #[error("pull request {pull_request} is stale: opened against {base}, main is at {head}")]
    StalePullRequest {
        pull_request: String,
        base: String,
        head: String,
    },

    /// Invalid input or operation.
    #[error("invalid: {0}")]
    Validation(String),

    /// Invalid state transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Contributor registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Version control error, including merge conflicts.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Outbox staging error.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl CollaborationError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::StalePullRequest { .. } => ErrorKind::StalePullRequest,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transition(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Vcs(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Sync(e) => e.kind(),
        }
    }

    /// Conflicting regions, if the merge failed on a conflict.
    pub fn conflicts(&self) -> Option<&[ConflictRegion]> {
        match self {
            Self::Vcs(VcsError::MergeConflict { regions }) => Some(regions),
            _ => None,
        }
    }
}

/// Result type for pull request operations.
pub type Result<T> = std::result::Result<T, CollaborationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_exposed() {
        let region = ConflictRegion {
            base_start: 1,
            base_end: 2,
            base: "b\n".into(),
            ours: "o\n".into(),
            theirs: "t\n".into(),
        };
        let err = CollaborationError::from(VcsError::MergeConflict {
            regions: vec![region.clone()],
        });
        assert_eq!(err.kind(), ErrorKind::MergeConflict);
        assert_eq!(err.conflicts(), Some(&[region][..]));

        let stale = CollaborationError::StalePullRequest {
            pull_request: "PR1".into(),
            base: "aaaa".into(),
            head: "bbbb".into(),
        };
        assert_eq!(stale.kind(), ErrorKind::StalePullRequest);
        assert!(stale.conflicts().is_none());
    }
}

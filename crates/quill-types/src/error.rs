//! Shared error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a failure, shared by every Quill crate.
///
/// Callers branch on the kind rather than on crate-specific variants: the HTTP
/// layer maps it to a status code and the sync worker uses it to decide
/// whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Proposal, branch, pull request, commit or contributor absent.
    NotFound,
    /// Actor lacks the required role or ownership.
    Unauthorized,
    /// A live contributor already exists for the (proposal, user) pair.
    DuplicateContributor,
    /// The target branch moved since the pull request was opened.
    StalePullRequest,
    /// Overlapping edits.
    MergeConflict,
    /// Empty or invalid input.
    Validation,
    /// Operation not allowed from the current lifecycle state.
    InvalidTransition,
    /// Operation cancelled before any state was written.
    Cancelled,
    /// Retryable transport failure towards the search index.
    SyncDelivery,
    /// Permanent rejection by the search index.
    SyncSchema,
    /// Backend failure or precondition race in the store.
    Storage,
}

impl ErrorKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::DuplicateContributor => "duplicate_contributor",
            Self::StalePullRequest => "stale_pull_request",
            Self::MergeConflict => "merge_conflict",
            Self::Validation => "validation",
            Self::InvalidTransition => "invalid_transition",
            Self::Cancelled => "cancelled",
            Self::SyncDelivery => "sync_delivery",
            Self::SyncSchema => "sync_schema",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by record-level state machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Invalid state transition.
    #[error("invalid state transition: cannot {action} when state is {current_state}")]
    InvalidStateTransition {
        action: &'static str,
        current_state: String,
    },

    /// Branch name does not follow `main` / `contributor/{id}`.
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    /// Malformed object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),
}

impl TransitionError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidBranchName(_) | Self::InvalidObjectId(_) => ErrorKind::Validation,
        }
    }
}

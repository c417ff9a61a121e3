//! Proposal status derivation.
//!
//! A proposal's status is never written directly. After every mutation the
//! owning component collects [`StatusInputs`] and asks the configured
//! [`StatusPolicy`] for the resulting status.

use serde::{Deserialize, Serialize};

use crate::ProposalStatus;

/// Facts a status policy may look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInputs {
    /// The owner archived the proposal.
    pub archived: bool,
    /// `main` moved away from the root commit.
    pub main_advanced: bool,
    /// Number of OPEN pull requests.
    pub open_pull_requests: usize,
    /// Number of MERGED pull requests.
    pub merged_pull_requests: usize,
}

/// Maps [`StatusInputs`] to a [`ProposalStatus`].
pub trait StatusPolicy: Send + Sync {
    /// Derives the status. Must be a pure function of `inputs`.
    fn derive(&self, inputs: &StatusInputs) -> ProposalStatus;
}

/// Status policy used unless configured otherwise.
///
/// ARCHIVED if archived; IN_REVIEW while any pull request is open; MERGED once
/// at least one pull request was merged; DRAFT otherwise. Direct owner edits on
/// `main` keep a proposal in DRAFT.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusPolicy;

impl StatusPolicy for DefaultStatusPolicy {
    fn derive(&self, inputs: &StatusInputs) -> ProposalStatus {
        if inputs.archived {
            ProposalStatus::Archived
        } else if inputs.open_pull_requests > 0 {
            ProposalStatus::InReview
        } else if inputs.merged_pull_requests > 0 {
            ProposalStatus::Merged
        } else {
            ProposalStatus::Draft
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let policy = DefaultStatusPolicy;
        let base = StatusInputs::default();

        assert_eq!(policy.derive(&base), ProposalStatus::Draft);
        assert_eq!(
            policy.derive(&StatusInputs {
                main_advanced: true,
                ..base
            }),
            ProposalStatus::Draft
        );
        assert_eq!(
            policy.derive(&StatusInputs {
                open_pull_requests: 1,
                merged_pull_requests: 3,
                ..base
            }),
            ProposalStatus::InReview
        );
        assert_eq!(
            policy.derive(&StatusInputs {
                merged_pull_requests: 1,
                ..base
            }),
            ProposalStatus::Merged
        );
        assert_eq!(
            policy.derive(&StatusInputs {
                archived: true,
                open_pull_requests: 1,
                ..base
            }),
            ProposalStatus::Archived
        );
    }
}

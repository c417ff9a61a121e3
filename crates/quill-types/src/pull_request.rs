//! Pull request records and state management.

use serde::{Deserialize, Serialize};

use crate::{
    BranchName, ContributorId, ObjectId, ProposalId, PullRequestId, Timestamp, TransitionError,
};

/// State of a pull request.
///
/// ```text
/// Open ──┬──> Merged (terminal)
///        ├──> Closed (terminal)
///        └──> Stale ──> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestStatus {
    /// Pull request is open and can be merged.
    Open,
    /// Pull request was merged into `main`.
    Merged,
    /// Pull request was closed without merging.
    Closed,
    /// `main` moved since the pull request was opened.
    Stale,
}

impl PullRequestStatus {
    /// Returns true for MERGED and CLOSED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "MERGED" => Some(Self::Merged),
            "CLOSED" => Some(Self::Closed),
            "STALE" => Some(Self::Stale),
            _ => None,
        }
    }
}

impl std::fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestStatus::Open => write!(f, "OPEN"),
            PullRequestStatus::Merged => write!(f, "MERGED"),
            PullRequestStatus::Closed => write!(f, "CLOSED"),
            PullRequestStatus::Stale => write!(f, "STALE"),
        }
    }
}

/// A request to merge a contributor's working branch into `main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Unique identifier.
    pub id: PullRequestId,
    /// Proposal the pull request belongs to.
    pub proposal_id: ProposalId,
    /// Contributor who opened it.
    pub author: ContributorId,
    /// The author's working branch.
    pub source_branch: BranchName,
    /// Always `main`.
    pub target_branch: BranchName,
    /// Head of `main` when the pull request was opened.
    pub base_commit: ObjectId,
    /// Head of the source branch when the pull request was opened.
    pub source_commit: ObjectId,
    /// Description supplied by the author.
    pub description: String,
    /// Current state.
    pub status: PullRequestStatus,
    /// Merge commit created by a successful merge.
    pub merge_commit: Option<ObjectId>,
    /// Contributor who merged it.
    pub merged_by: Option<ContributorId>,
    /// Contributor who closed it.
    pub closed_by: Option<ContributorId>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last transition time.
    pub updated_at: Timestamp,
}

impl PullRequest {
    /// Creates an open pull request.
    pub fn new(
        id: PullRequestId,
        proposal_id: ProposalId,
        author: ContributorId,
        base_commit: ObjectId,
        source_commit: ObjectId,
        description: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            proposal_id,
            author,
            source_branch: BranchName::working(author),
            target_branch: BranchName::Main,
            base_commit,
            source_commit,
            description: description.into(),
            status: PullRequestStatus::Open,
            merge_commit: None,
            merged_by: None,
            closed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the pull request is open.
    pub fn is_open(&self) -> bool {
        self.status == PullRequestStatus::Open
    }

    /// Merges the pull request.
    pub fn merge(&mut self, merged_by: ContributorId, merge_commit: ObjectId) -> Result<(), TransitionError> {
        self.require_open("merge")?;
        self.status = PullRequestStatus::Merged;
        self.merged_by = Some(merged_by);
        self.merge_commit = Some(merge_commit);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the pull request stale because `main` moved.
    pub fn mark_stale(&mut self) -> Result<(), TransitionError> {
        self.require_open("mark stale")?;
        self.status = PullRequestStatus::Stale;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Closes the pull request without merging.
    pub fn close(&mut self, closed_by: ContributorId) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::InvalidStateTransition {
                action: "close",
                current_state: self.status.to_string(),
            });
        }
        self.status = PullRequestStatus::Closed;
        self.closed_by = Some(closed_by);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    fn require_open(&self, action: &'static str) -> Result<(), TransitionError> {
        if self.status != PullRequestStatus::Open {
            return Err(TransitionError::InvalidStateTransition {
                action,
                current_state: self.status.to_string(),
            });
        }
        Ok(())
    }
}

//! Contributor records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContributorId, ProposalId, Timestamp, TransitionError, UserId};

/// Role of a contributor on a proposal.
///
/// Roles are ordered: Editor < Maintainer < Owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributorRole {
    /// Can edit their own working branch and open pull requests.
    Editor,
    /// Can additionally merge pull requests and update the title.
    Maintainer,
    /// Full control, including direct edits to `main` before the first fork.
    Owner,
}

impl ContributorRole {
    /// Check if this role grants at least the required level.
    pub fn has(&self, required: ContributorRole) -> bool {
        *self >= required
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "editor" | "write" => Some(Self::Editor),
            "maintainer" => Some(Self::Maintainer),
            "owner" | "admin" => Some(Self::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for ContributorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Editor => write!(f, "EDITOR"),
            Self::Maintainer => write!(f, "MAINTAINER"),
            Self::Owner => write!(f, "OWNER"),
        }
    }
}

/// Membership status of a contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributorStatus {
    /// Invited, not yet accepted.
    Pending,
    /// Allowed to act on the proposal.
    Active,
    /// Removed; history is kept.
    Removed,
}

impl fmt::Display for ContributorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Removed => write!(f, "REMOVED"),
        }
    }
}

/// A user's membership in one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Unique contributor id.
    pub id: ContributorId,
    /// Proposal this membership belongs to.
    pub proposal_id: ProposalId,
    /// External user id.
    pub user_id: UserId,
    /// Display name, denormalized for snapshots.
    pub display_name: String,
    /// Role on the proposal.
    pub role: ContributorRole,
    /// Membership status.
    pub status: ContributorStatus,
    /// When the contributor was added.
    pub created_at: Timestamp,
    /// When the record was last changed.
    pub updated_at: Timestamp,
}

impl Contributor {
    /// Creates a contributor record.
    pub fn new(
        id: ContributorId,
        proposal_id: ProposalId,
        user_id: UserId,
        display_name: impl Into<String>,
        role: ContributorRole,
        status: ContributorStatus,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            proposal_id,
            user_id,
            display_name: display_name.into(),
            role,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the contributor may act on the proposal.
    pub fn is_active(&self) -> bool {
        self.status == ContributorStatus::Active
    }

    /// Returns true unless the contributor was removed.
    pub fn is_live(&self) -> bool {
        self.status != ContributorStatus::Removed
    }

    /// Accepts a pending invitation.
    pub fn activate(&mut self) -> Result<(), TransitionError> {
        if self.status != ContributorStatus::Pending {
            return Err(TransitionError::InvalidStateTransition {
                action: "activate",
                current_state: self.status.to_string(),
            });
        }
        self.status = ContributorStatus::Active;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the contributor as removed.
    pub fn remove(&mut self) -> Result<(), TransitionError> {
        if self.status == ContributorStatus::Removed {
            return Err(TransitionError::InvalidStateTransition {
                action: "remove",
                current_state: self.status.to_string(),
            });
        }
        self.status = ContributorStatus::Removed;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}

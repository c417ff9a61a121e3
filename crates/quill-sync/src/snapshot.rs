//! Denormalized proposal projection sent to the search index.

use quill_storage::BatchView;
use quill_types::{
    BranchName, Contributor, ContributorId, ContributorRole, ContributorStatus, ObjectId,
    Proposal, ProposalId, ProposalStatus, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Result, SyncError};

/// Contributor entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContributor {
    pub id: ContributorId,
    pub user_id: UserId,
    pub display_name: String,
    pub role: ContributorRole,
    pub status: ContributorStatus,
}

impl From<&Contributor> for SnapshotContributor {
    fn from(c: &Contributor) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id.clone(),
            display_name: c.display_name.clone(),
            role: c.role,
            status: c.status,
        }
    }
}

/// Point-in-time copy of a proposal as the search index stores it.
///
/// Search documents are keyed by `id`; an index never replaces a document
/// with one of a lower `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSnapshot {
    pub id: ProposalId,
    pub title: String,
    /// Full text at the head of `main`.
    pub content: String,
    pub owner_id: UserId,
    pub owner_name: String,
    pub contributors: Vec<SnapshotContributor>,
    pub version: u64,
    pub status: ProposalStatus,
    pub stats: BTreeMap<String, i64>,
    /// Names of the contributors' working branches.
    pub branches: Vec<String>,
    /// Head commit of `main`.
    pub last_commit: ObjectId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PublishSnapshot {
    /// Projects `proposal` together with the related state visible in `view`.
    pub fn build(view: &BatchView<'_>, proposal: &Proposal) -> Result<Self> {
        let commit = view
            .commit(&proposal.head)?
            .ok_or_else(|| SyncError::NotFound(format!("head commit {}", proposal.head.short())))?;
        let blob = view
            .blob(&commit.content)?
            .ok_or_else(|| SyncError::NotFound(format!("content {}", commit.content.short())))?;

        let contributors = view
            .contributors(proposal.id)?
            .iter()
            .map(SnapshotContributor::from)
            .collect();
        let branches = view
            .branches(proposal.id)?
            .into_iter()
            .filter(|b| b.name != BranchName::Main)
            .map(|b| b.name.to_string())
            .collect();

        Ok(Self {
            id: proposal.id,
            title: proposal.title.clone(),
            content: blob.content,
            owner_id: proposal.owner.id.clone(),
            owner_name: proposal.owner.name.clone(),
            contributors,
            version: proposal.version,
            status: proposal.status(),
            stats: proposal.stats.clone(),
            branches,
            last_commit: proposal.head,
            created_at: proposal.created_at,
            updated_at: proposal.updated_at,
        })
    }

    /// Score the index orders by.
    pub fn votes(&self) -> i64 {
        self.stats
            .get(quill_types::stats::VOTES)
            .copied()
            .unwrap_or(0)
    }
}

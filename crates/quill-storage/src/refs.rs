//! Branch head pointers.

use quill_types::{BranchName, ObjectId, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};

/// A named, mutable pointer into a proposal's commit graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Owning proposal.
    pub proposal_id: ProposalId,
    /// Branch name.
    pub name: BranchName,
    /// Current head commit.
    pub head: ObjectId,
    /// Commit the branch was forked from.
    pub forked_from: ObjectId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last head update.
    pub updated_at: Timestamp,
}

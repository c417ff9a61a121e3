//! The persistence port.
//!
//! Defines the interface every storage backend implements. Components never
//! talk to a concrete store; they receive an `Arc<dyn ProposalStore>` at
//! construction.

use quill_types::{
    BranchName, Contributor, ContributorId, ObjectId, Proposal, ProposalId, PullRequest,
    PullRequestId,
};
use std::sync::Arc;

use crate::{Blob, Branch, Commit, OutboxRecord, Page, ProposalQuery, Result, WriteBatch};

/// Id sequences handed out by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSpace {
    /// Proposal ids.
    Proposal,
    /// Contributor ids.
    Contributor,
    /// Pull request ids.
    PullRequest,
}

/// Outcome of a successfully applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Ids assigned to the outbox rows of the batch, in batch order.
    pub outbox_ids: Vec<u64>,
}

/// Storage backend for proposals.
///
/// Reads return `Ok(None)` / empty collections for absent items; `Err` is
/// reserved for backend failures.
pub trait ProposalStore: Send + Sync {
    /// Allocates the next id of a sequence. Ids are never reused.
    fn next_id(&self, space: IdSpace) -> Result<u64>;

    /// Applies `batch` atomically.
    ///
    /// Every [`crate::BranchUpdate`] precondition is checked before anything is
    /// written; if one fails the call returns [`crate::StorageError::HeadMoved`]
    /// and the store is unchanged.
    fn apply(&self, batch: WriteBatch) -> Result<Applied>;

    // ---- proposals ----

    /// Gets a proposal.
    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>>;

    /// Lists proposals, see [`ProposalQuery`] for the semantics.
    fn list_proposals(&self, query: &ProposalQuery) -> Result<Page<Proposal>>;

    // ---- commit graph ----

    /// Gets a commit by hash.
    fn commit(&self, id: &ObjectId) -> Result<Option<Commit>>;

    /// Gets a content blob by hash.
    fn blob(&self, id: &ObjectId) -> Result<Option<Blob>>;

    /// Gets a branch.
    fn branch(&self, proposal_id: ProposalId, name: &BranchName) -> Result<Option<Branch>>;

    /// Lists a proposal's branches, `main` first.
    fn branches(&self, proposal_id: ProposalId) -> Result<Vec<Branch>>;

    // ---- contributors ----

    /// Gets a contributor.
    fn contributor(&self, id: ContributorId) -> Result<Option<Contributor>>;

    /// Lists a proposal's contributors (including removed ones) by id.
    fn contributors(&self, proposal_id: ProposalId) -> Result<Vec<Contributor>>;

    // ---- pull requests ----

    /// Gets a pull request.
    fn pull_request(&self, id: PullRequestId) -> Result<Option<PullRequest>>;

    /// Lists a proposal's pull requests by id.
    fn pull_requests(&self, proposal_id: ProposalId) -> Result<Vec<PullRequest>>;

    // ---- outbox ----

    /// Oldest pending rows, at most `limit`.
    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Rows marked failed.
    fn failed_outbox(&self) -> Result<Vec<OutboxRecord>>;

    /// Gets a row.
    fn outbox_record(&self, id: u64) -> Result<Option<OutboxRecord>>;

    /// Deletes an acknowledged row. Returns false if it was already gone.
    fn ack_outbox(&self, id: u64) -> Result<bool>;

    /// Records a failed attempt; `give_up` marks the row failed.
    fn record_outbox_failure(&self, id: u64, error: &str, give_up: bool) -> Result<()>;

    /// Moves a failed row back to pending with a fresh attempt budget.
    fn requeue_outbox(&self, id: u64) -> Result<()>;

    /// Convenience: the head of a branch.
    fn branch_head(&self, proposal_id: ProposalId, name: &BranchName) -> Result<Option<ObjectId>> {
        Ok(self.branch(proposal_id, name)?.map(|b| b.head))
    }
}

impl<T: ProposalStore + ?Sized> ProposalStore for Arc<T> {
    fn next_id(&self, space: IdSpace) -> Result<u64> {
        (**self).next_id(space)
    }

    fn apply(&self, batch: WriteBatch) -> Result<Applied> {
        (**self).apply(batch)
    }

    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        (**self).proposal(id)
    }

    fn list_proposals(&self, query: &ProposalQuery) -> Result<Page<Proposal>> {
        (**self).list_proposals(query)
    }

    fn commit(&self, id: &ObjectId) -> Result<Option<Commit>> {
        (**self).commit(id)
    }

    fn blob(&self, id: &ObjectId) -> Result<Option<Blob>> {
        (**self).blob(id)
    }

    fn branch(&self, proposal_id: ProposalId, name: &BranchName) -> Result<Option<Branch>> {
        (**self).branch(proposal_id, name)
    }

    fn branches(&self, proposal_id: ProposalId) -> Result<Vec<Branch>> {
        (**self).branches(proposal_id)
    }

    fn contributor(&self, id: ContributorId) -> Result<Option<Contributor>> {
        (**self).contributor(id)
    }

    fn contributors(&self, proposal_id: ProposalId) -> Result<Vec<Contributor>> {
        (**self).contributors(proposal_id)
    }

    fn pull_request(&self, id: PullRequestId) -> Result<Option<PullRequest>> {
        (**self).pull_request(id)
    }

    fn pull_requests(&self, proposal_id: ProposalId) -> Result<Vec<PullRequest>> {
        (**self).pull_requests(proposal_id)
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        (**self).pending_outbox(limit)
    }

    fn failed_outbox(&self) -> Result<Vec<OutboxRecord>> {
        (**self).failed_outbox()
    }

    fn outbox_record(&self, id: u64) -> Result<Option<OutboxRecord>> {
        (**self).outbox_record(id)
    }

    fn ack_outbox(&self, id: u64) -> Result<bool> {
        (**self).ack_outbox(id)
    }

    fn record_outbox_failure(&self, id: u64, error: &str, give_up: bool) -> Result<()> {
        (**self).record_outbox_failure(id, error, give_up)
    }

    fn requeue_outbox(&self, id: u64) -> Result<()> {
        (**self).requeue_outbox(id)
    }
}

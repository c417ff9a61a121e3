//! Atomic write batches and the read overlay used while building them.

use quill_types::{
    BranchName, Contributor, ContributorId, ObjectId, Proposal, ProposalId, PullRequest,
    PullRequestId, Timestamp,
};
use std::collections::BTreeMap;

use crate::{Blob, Branch, Commit, NewOutboxEntry, ProposalStore, Result};

/// A guarded branch-head write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchUpdate {
    /// Owning proposal.
    pub proposal_id: ProposalId,
    /// Branch to write.
    pub name: BranchName,
    /// Head the writer read; `None` means the branch must not exist yet.
    pub expected: Option<ObjectId>,
    /// New head.
    pub head: ObjectId,
}

/// A set of writes applied all-or-nothing by [`ProposalStore::apply`].
///
/// Records are upserts keyed by their id. Commits and blobs are
/// content-addressed, so writing an existing one is a no-op.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) proposals: BTreeMap<ProposalId, Proposal>,
    pub(crate) commits: Vec<Commit>,
    pub(crate) blobs: Vec<Blob>,
    pub(crate) branches: Vec<BranchUpdate>,
    pub(crate) contributors: BTreeMap<ContributorId, Contributor>,
    pub(crate) pull_requests: BTreeMap<PullRequestId, PullRequest>,
    pub(crate) outbox: Vec<NewOutboxEntry>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a proposal.
    pub fn put_proposal(&mut self, proposal: Proposal) -> &mut Self {
        self.proposals.insert(proposal.id, proposal);
        self
    }

    /// Records a commit.
    pub fn put_commit(&mut self, commit: Commit) -> &mut Self {
        self.commits.push(commit);
        self
    }

    /// Records a content blob.
    pub fn put_blob(&mut self, blob: Blob) -> &mut Self {
        self.blobs.push(blob);
        self
    }

    /// Moves (or creates) a branch head, guarded by `expected`.
    pub fn set_branch(
        &mut self,
        proposal_id: ProposalId,
        name: BranchName,
        expected: Option<ObjectId>,
        head: ObjectId,
    ) -> &mut Self {
        self.branches.push(BranchUpdate {
            proposal_id,
            name,
            expected,
            head,
        });
        self
    }

    /// Upserts a contributor.
    pub fn put_contributor(&mut self, contributor: Contributor) -> &mut Self {
        self.contributors.insert(contributor.id, contributor);
        self
    }

    /// Upserts a pull request.
    pub fn put_pull_request(&mut self, pull_request: PullRequest) -> &mut Self {
        self.pull_requests.insert(pull_request.id, pull_request);
        self
    }

    /// Enqueues an outbox row.
    pub fn enqueue(&mut self, entry: NewOutboxEntry) -> &mut Self {
        self.outbox.push(entry);
        self
    }

    /// Returns true if the batch writes nothing.
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
            && self.commits.is_empty()
            && self.blobs.is_empty()
            && self.branches.is_empty()
            && self.contributors.is_empty()
            && self.pull_requests.is_empty()
            && self.outbox.is_empty()
    }

    /// Branch updates of the batch.
    pub fn branch_updates(&self) -> &[BranchUpdate] {
        &self.branches
    }

    /// Outbox rows of the batch.
    pub fn outbox_entries(&self) -> &[NewOutboxEntry] {
        &self.outbox
    }

    /// Proposals written by the batch.
    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Read view of `store` as it will look once this batch is applied.
    pub fn view<'a>(&'a self, store: &'a dyn ProposalStore) -> BatchView<'a> {
        BatchView { store, batch: self }
    }
}

/// Read-through overlay of a pending [`WriteBatch`] on top of a store.
///
/// Used while a mutation is still assembling its batch, e.g. to build the
/// publish snapshot from the post-mutation state.
pub struct BatchView<'a> {
    store: &'a dyn ProposalStore,
    batch: &'a WriteBatch,
}

impl<'a> BatchView<'a> {
    /// Gets a proposal.
    pub fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        match self.batch.proposals.get(&id) {
            Some(p) => Ok(Some(p.clone())),
            None => self.store.proposal(id),
        }
    }

    /// Gets a commit.
    pub fn commit(&self, id: &ObjectId) -> Result<Option<Commit>> {
        match self.batch.commits.iter().find(|c| &c.id == id) {
            Some(c) => Ok(Some(c.clone())),
            None => self.store.commit(id),
        }
    }

    /// Gets a blob.
    pub fn blob(&self, id: &ObjectId) -> Result<Option<Blob>> {
        match self.batch.blobs.iter().find(|b| &b.id == id) {
            Some(b) => Ok(Some(b.clone())),
            None => self.store.blob(id),
        }
    }

    /// Lists branches of a proposal including pending head moves.
    pub fn branches(&self, proposal_id: ProposalId) -> Result<Vec<Branch>> {
        let mut branches = self.store.branches(proposal_id)?;
        for update in self
            .batch
            .branches
            .iter()
            .filter(|u| u.proposal_id == proposal_id)
        {
            match branches.iter_mut().find(|b| b.name == update.name) {
                Some(branch) => branch.head = update.head,
                None => {
                    let now = Timestamp::now();
                    branches.push(Branch {
                        proposal_id,
                        name: update.name,
                        head: update.head,
                        forked_from: update.head,
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
        }
        Ok(branches)
    }

    /// Lists contributors of a proposal including pending writes.
    pub fn contributors(&self, proposal_id: ProposalId) -> Result<Vec<Contributor>> {
        let mut merged: BTreeMap<ContributorId, Contributor> = self
            .store
            .contributors(proposal_id)?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        for c in self.batch.contributors.values() {
            if c.proposal_id == proposal_id {
                merged.insert(c.id, c.clone());
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Lists pull requests of a proposal including pending writes.
    pub fn pull_requests(&self, proposal_id: ProposalId) -> Result<Vec<PullRequest>> {
        let mut merged: BTreeMap<PullRequestId, PullRequest> = self
            .store
            .pull_requests(proposal_id)?
            .into_iter()
            .map(|pr| (pr.id, pr))
            .collect();
        for pr in self.batch.pull_requests.values() {
            if pr.proposal_id == proposal_id {
                merged.insert(pr.id, pr.clone());
            }
        }
        Ok(merged.into_values().collect())
    }
}

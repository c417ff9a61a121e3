//! Proposal metadata operations.

use quill_storage::{Blob, Commit, IdSpace, Page, ProposalQuery, WriteBatch};
use quill_types::{
    BranchName, ContributorId, ContributorRole, ContributorStatus, Proposal, ProposalId,
    PullRequestStatus, UserId, UserRef,
};

use crate::engine::require_message;
use crate::{Result, VcsError, VersionControlEngine};

impl VersionControlEngine {
    /// Creates a proposal: root commit on `main`, owner enrolled as OWNER.
    pub fn create_proposal(
        &self,
        owner: UserRef,
        title: &str,
        content: &str,
        message: &str,
    ) -> Result<Proposal> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VcsError::Validation("title must not be empty".into()));
        }
        if content.trim().is_empty() {
            return Err(VcsError::EmptyContent);
        }
        require_message(message)?;

        let proposal_id = ProposalId::new(self.store.next_id(IdSpace::Proposal)?);
        let contributor = self.registry.new_contributor(
            proposal_id,
            &owner,
            ContributorRole::Owner,
            ContributorStatus::Active,
        )?;
        let blob = Blob::new(content);
        let root = Commit::new(proposal_id, &[], blob.id, contributor.id, message);

        let proposal = self.locks.with(proposal_id, || -> Result<Proposal> {
            let mut batch = WriteBatch::new();
            batch
                .put_blob(blob)
                .put_commit(root.clone())
                .set_branch(proposal_id, BranchName::Main, None, root.id)
                .put_contributor(contributor);
            let proposal = self.outbox.stage_change(
                self.store.as_ref(),
                &mut batch,
                Proposal::new(proposal_id, title, owner, root.id),
            )?;
            self.store.apply(batch)?;
            Ok(proposal)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            owner = %proposal.owner.id,
            root = %root.id.short(),
            "proposal created"
        );
        self.outbox.notify();
        Ok(proposal)
    }

    /// Renames a proposal. Needs MAINTAINER or higher.
    pub fn update_title(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
        title: &str,
        message: &str,
    ) -> Result<Proposal> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VcsError::Validation("title must not be empty".into()));
        }
        require_message(message)?;

        let proposal = self.locks.with(proposal_id, || -> Result<Proposal> {
            let mut proposal = self.live_proposal(proposal_id)?;
            self.registry
                .authorize(proposal_id, contributor_id, ContributorRole::Maintainer)?;
            if proposal.title == title {
                return Err(VcsError::Validation("title is unchanged".into()));
            }
            proposal.rename(title, contributor_id, message);

            let mut batch = WriteBatch::new();
            let proposal = self
                .outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(proposal)
        })?;

        tracing::info!(proposal_id = %proposal_id, contributor_id = %contributor_id, "title updated");
        self.outbox.notify();
        Ok(proposal)
    }

    /// Freezes a proposal and withdraws it from the search index. Needs OWNER.
    ///
    /// Open and stale pull requests are closed in the same batch.
    pub fn archive(&self, proposal_id: ProposalId, contributor_id: ContributorId) -> Result<Proposal> {
        let proposal = self.locks.with(proposal_id, || -> Result<Proposal> {
            let mut proposal = self.live_proposal(proposal_id)?;
            self.registry
                .authorize(proposal_id, contributor_id, ContributorRole::Owner)?;
            proposal.archive();

            let mut batch = WriteBatch::new();
            for mut pr in self.store.pull_requests(proposal_id)? {
                if matches!(pr.status, PullRequestStatus::Open | PullRequestStatus::Stale) {
                    pr.close(contributor_id)?;
                    batch.put_pull_request(pr);
                }
            }
            let proposal = self
                .outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(proposal)
        })?;

        tracing::info!(proposal_id = %proposal_id, contributor_id = %contributor_id, "proposal archived");
        self.outbox.notify();
        Ok(proposal)
    }

    /// Records a user's vote: +1, -1, or 0 to retract.
    pub fn record_vote(&self, proposal_id: ProposalId, user: UserId, value: i8) -> Result<Proposal> {
        if !(-1..=1).contains(&value) {
            return Err(VcsError::Validation(format!("vote must be -1, 0 or 1, got {value}")));
        }

        let proposal = self.locks.with(proposal_id, || -> Result<Proposal> {
            let mut proposal = self.live_proposal(proposal_id)?;
            proposal.apply_vote(user, value);

            let mut batch = WriteBatch::new();
            let proposal = self
                .outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(proposal)
        })?;

        tracing::debug!(proposal_id = %proposal_id, value, "vote recorded");
        self.outbox.notify();
        Ok(proposal)
    }

    /// Gets a proposal.
    pub fn get_proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        self.proposal(proposal_id)
    }

    /// Lists proposals.
    pub fn list_proposals(&self, query: &ProposalQuery) -> Result<Page<Proposal>> {
        Ok(self.store.list_proposals(query)?)
    }
}

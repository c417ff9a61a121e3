//! Pull request lifecycle.

use std::sync::Arc;

use quill_registry::ContributorRegistry;
use quill_storage::{IdSpace, ProposalLocks, ProposalStore, WriteBatch};
use quill_sync::Outbox;
use quill_types::{
    BranchName, ContributorId, ContributorRole, ObjectId, Proposal, ProposalId, PullRequest,
    PullRequestId, PullRequestStatus, TransitionError,
};
use quill_vcs::{Diff, VersionControlEngine};

use crate::{CollaborationError, Result};

/// Outcome of a merge attempt decided under the proposal lock.
enum Attempt {
    Merged(PullRequest),
    Stale { base: ObjectId, head: ObjectId },
}

/// Opens, merges and closes pull requests.
///
/// Every transition runs under the proposal lock and lands in one batch
/// together with the proposal's refreshed stats and its outbox row.
pub struct PullRequestManager {
    store: Arc<dyn ProposalStore>,
    locks: Arc<ProposalLocks>,
    outbox: Outbox,
    registry: Arc<ContributorRegistry>,
    engine: Arc<VersionControlEngine>,
}

impl PullRequestManager {
    /// Creates a manager sharing the engine's store and locks.
    pub fn new(
        store: Arc<dyn ProposalStore>,
        locks: Arc<ProposalLocks>,
        outbox: Outbox,
        registry: Arc<ContributorRegistry>,
        engine: Arc<VersionControlEngine>,
    ) -> Self {
        Self {
            store,
            locks,
            outbox,
            registry,
            engine,
        }
    }

    /// Opens a pull request from the contributor's working branch into `main`.
    pub fn open(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
        description: &str,
    ) -> Result<PullRequest> {
        let pr = self.locks.with(proposal_id, || -> Result<PullRequest> {
            let proposal = self.live_proposal(proposal_id)?;
            self.registry
                .authorize(proposal_id, contributor_id, ContributorRole::Editor)?;

            let existing = self.store.pull_requests(proposal_id)?;
            if existing
                .iter()
                .any(|pr| pr.author == contributor_id && pr.is_open())
            {
                return Err(CollaborationError::Validation(format!(
                    "contributor {contributor_id} already has an open pull request on {proposal_id}"
                )));
            }

            let branch = BranchName::working(contributor_id);
            let source = self
                .store
                .branch_head(proposal_id, &branch)?
                .ok_or_else(|| {
                    CollaborationError::NotFound(format!("branch {proposal_id}/{branch}"))
                })?;
            let base = self.main_head(proposal_id)?;
            if self.engine.is_ancestor(&source, &base)? {
                return Err(CollaborationError::Validation(format!(
                    "{branch} has no changes beyond main"
                )));
            }

            let id = PullRequestId::new(self.store.next_id(IdSpace::PullRequest)?);
            let pr = PullRequest::new(id, proposal_id, contributor_id, base, source, description.trim());

            let mut batch = WriteBatch::new();
            batch.put_pull_request(pr.clone());
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(pr)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            pull_request_id = %pr.id,
            contributor_id = %contributor_id,
            base = %pr.base_commit.short(),
            "pull request opened"
        );
        self.outbox.notify();
        Ok(pr)
    }

    /// Merges an open pull request into `main`.
    ///
    /// If `main` moved since the pull request was opened it is marked STALE
    /// and the call fails with [`CollaborationError::StalePullRequest`]. On a
    /// merge conflict nothing is written and the pull request stays OPEN.
    pub fn merge(
        &self,
        pull_request_id: PullRequestId,
        merger: ContributorId,
        message: &str,
    ) -> Result<PullRequest> {
        if message.trim().is_empty() {
            return Err(CollaborationError::Validation("a message is required".into()));
        }
        let proposal_id = self.get(pull_request_id)?.proposal_id;

        let attempt = self.locks.with(proposal_id, || -> Result<Attempt> {
            let mut pr = self.get(pull_request_id)?;
            match pr.status {
                PullRequestStatus::Open => {}
                PullRequestStatus::Stale => {
                    let head = self.main_head(proposal_id)?;
                    return Ok(Attempt::Stale {
                        base: pr.base_commit,
                        head,
                    });
                }
                status => {
                    return Err(TransitionError::InvalidStateTransition {
                        action: "merge",
                        current_state: status.to_string(),
                    }
                    .into());
                }
            }
            let mut proposal = self.live_proposal(proposal_id)?;
            self.registry
                .authorize(proposal_id, merger, ContributorRole::Maintainer)?;

            let head = self.main_head(proposal_id)?;
            let mut batch = WriteBatch::new();
            if head != pr.base_commit {
                pr.mark_stale()?;
                batch.put_pull_request(pr.clone());
                self.outbox
                    .stage_change(self.store.as_ref(), &mut batch, proposal)?;
                self.store.apply(batch)?;
                return Ok(Attempt::Stale {
                    base: pr.base_commit,
                    head,
                });
            }

            let ancestor =
                self.engine
                    .branch_merge_base(proposal_id, &pr.source_branch, &pr.target_branch)?;
            let plan = self.engine.prepare_merge(
                proposal_id,
                &pr.source_branch,
                &pr.target_branch,
                ancestor,
                merger,
                message,
            )?;
            plan.stage(&mut batch);
            plan.apply_to(&mut proposal);
            pr.source_commit = plan.source_head;
            pr.merge(merger, plan.commit.id)?;
            batch.put_pull_request(pr.clone());
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(Attempt::Merged(pr))
        })?;
        self.outbox.notify();

        match attempt {
            Attempt::Merged(pr) => {
                let commit = pr.merge_commit.map(|c| c.short()).unwrap_or_default();
                tracing::info!(
                    proposal_id = %proposal_id,
                    pull_request_id = %pull_request_id,
                    merger = %merger,
                    commit = %commit,
                    "pull request merged"
                );
                Ok(pr)
            }
            Attempt::Stale { base, head } => {
                tracing::warn!(
                    proposal_id = %proposal_id,
                    pull_request_id = %pull_request_id,
                    base = %base.short(),
                    head = %head.short(),
                    "pull request is stale"
                );
                Err(CollaborationError::StalePullRequest {
                    pull_request: pull_request_id.to_string(),
                    base: base.short(),
                    head: head.short(),
                })
            }
        }
    }

    /// Closes an open or stale pull request. Allowed for the author and owners.
    pub fn close(&self, pull_request_id: PullRequestId, actor: ContributorId) -> Result<PullRequest> {
        let proposal_id = self.get(pull_request_id)?.proposal_id;

        let pr = self.locks.with(proposal_id, || -> Result<PullRequest> {
            let mut pr = self.get(pull_request_id)?;
            let proposal = self.live_proposal(proposal_id)?;
            if actor != pr.author {
                self.registry
                    .authorize(proposal_id, actor, ContributorRole::Owner)
                    .map_err(|_| {
                        CollaborationError::Unauthorized(format!(
                            "only the author or an owner may close {pull_request_id}"
                        ))
                    })?;
            }
            pr.close(actor)?;

            let mut batch = WriteBatch::new();
            batch.put_pull_request(pr.clone());
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(pr)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            pull_request_id = %pull_request_id,
            actor = %actor,
            "pull request closed"
        );
        self.outbox.notify();
        Ok(pr)
    }

    /// Gets a pull request.
    pub fn get(&self, pull_request_id: PullRequestId) -> Result<PullRequest> {
        self.store
            .pull_request(pull_request_id)?
            .ok_or_else(|| CollaborationError::NotFound(format!("pull request {pull_request_id}")))
    }

    /// Lists a proposal's pull requests, optionally filtered by status.
    pub fn list(
        &self,
        proposal_id: ProposalId,
        status: Option<PullRequestStatus>,
    ) -> Result<Vec<PullRequest>> {
        self.proposal(proposal_id)?;
        let mut prs = self.store.pull_requests(proposal_id)?;
        if let Some(status) = status {
            prs.retain(|pr| pr.status == status);
        }
        Ok(prs)
    }

    /// Changes under review: base against the source branch's current head.
    ///
    /// Terminal pull requests show the source commit they ended with.
    pub fn review_diff(&self, pull_request_id: PullRequestId) -> Result<Diff> {
        let pr = self.get(pull_request_id)?;
        let head = if pr.status.is_terminal() {
            pr.source_commit
        } else {
            self.store
                .branch_head(pr.proposal_id, &pr.source_branch)?
                .unwrap_or(pr.source_commit)
        };
        Ok(self.engine.diff(&pr.base_commit, &head)?)
    }

    fn main_head(&self, proposal_id: ProposalId) -> Result<ObjectId> {
        Ok(self.engine.branch_head(proposal_id, &BranchName::Main)?)
    }

    fn proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        self.store
            .proposal(proposal_id)?
            .ok_or_else(|| CollaborationError::NotFound(format!("proposal {proposal_id}")))
    }

    fn live_proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        let proposal = self.proposal(proposal_id)?;
        if proposal.is_archived() {
            return Err(CollaborationError::Validation(format!(
                "proposal {proposal_id} is archived"
            )));
        }
        Ok(proposal)
    }
}

//! The version control engine: commits, diffs and merges.

use quill_registry::ContributorRegistry;
use quill_storage::{Blob, Branch, Commit, ProposalLocks, ProposalStore, WriteBatch};
use quill_sync::Outbox;
use quill_types::{
    stats, BranchName, ContributorId, ContributorRole, ObjectId, Proposal, ProposalId,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::diff::{diff, Diff};
use crate::graph;
use crate::merge::{merge3, MergeOptions, MergeOutcome};
use crate::{Result, VcsError};

/// A merge computed against the current heads, not yet written.
///
/// Staging the plan moves the target branch with a compare-and-swap on the
/// head the plan was computed from, so a plan applied after the target moved
/// is rejected by the store.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub proposal_id: ProposalId,
    pub source: BranchName,
    pub target: BranchName,
    /// Target head the plan was computed from ("ours").
    pub target_head: ObjectId,
    /// Source head merged in ("theirs").
    pub source_head: ObjectId,
    /// Common ancestor used for the three-way merge.
    pub ancestor: ObjectId,
    /// The target had not moved since the ancestor.
    pub fast_forward: bool,
    /// The merge commit (parents: target head, source head).
    pub commit: Commit,
    blob: Blob,
}

impl MergePlan {
    /// Adds the merge commit and the target head move to `batch`.
    pub fn stage(&self, batch: &mut WriteBatch) {
        batch
            .put_blob(self.blob.clone())
            .put_commit(self.commit.clone())
            .set_branch(
                self.proposal_id,
                self.target,
                Some(self.target_head),
                self.commit.id,
            );
    }

    /// Reflects the merge in the proposal record.
    pub fn apply_to(&self, proposal: &mut Proposal) {
        proposal.bump_stat(stats::COMMITS, 1);
        if self.target.is_main() {
            proposal.head = self.commit.id;
        }
    }
}

/// Outcome of [`VersionControlEngine::merge`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub commit: Commit,
    pub fast_forward: bool,
    pub proposal: Proposal,
}

/// Branch and commit management for proposals.
///
/// Every mutation runs under the proposal's lock and is committed as one
/// batch together with its publish snapshot. Reads take no lock.
pub struct VersionControlEngine {
    pub(crate) store: Arc<dyn ProposalStore>,
    pub(crate) locks: Arc<ProposalLocks>,
    pub(crate) outbox: Outbox,
    pub(crate) registry: Arc<ContributorRegistry>,
    options: MergeOptions,
}

impl VersionControlEngine {
    /// Creates an engine.
    pub fn new(
        store: Arc<dyn ProposalStore>,
        locks: Arc<ProposalLocks>,
        outbox: Outbox,
        registry: Arc<ContributorRegistry>,
        options: MergeOptions,
    ) -> Self {
        Self {
            store,
            locks,
            outbox,
            registry,
            options,
        }
    }

    /// The configured merge policy.
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Records a content edit on `branch`.
    ///
    /// The contributor must be ACTIVE and own the branch. A contributor's
    /// first edit creates their working branch from `main`'s head. The owner
    /// may edit `main` directly until the first working branch exists.
    pub fn create_commit(
        &self,
        proposal_id: ProposalId,
        branch: BranchName,
        contributor_id: ContributorId,
        new_content: &str,
        message: &str,
    ) -> Result<Commit> {
        if new_content.trim().is_empty() {
            return Err(VcsError::EmptyContent);
        }
        require_message(message)?;

        let commit = self.locks.with(proposal_id, || -> Result<Commit> {
            let mut proposal = self.live_proposal(proposal_id)?;
            let contributor =
                self.registry
                    .authorize(proposal_id, contributor_id, ContributorRole::Editor)?;

            match branch {
                BranchName::Main => {
                    if contributor.role != ContributorRole::Owner {
                        return Err(VcsError::Unauthorized(
                            "only the owner edits main directly".into(),
                        ));
                    }
                    let forked = self
                        .store
                        .branches(proposal_id)?
                        .iter()
                        .any(|b| !b.name.is_main());
                    if forked {
                        return Err(VcsError::Unauthorized(
                            "main only changes through pull requests once a branch exists".into(),
                        ));
                    }
                }
                BranchName::Contributor(owner) if owner != contributor_id => {
                    return Err(VcsError::Unauthorized(format!(
                        "branch {branch} belongs to another contributor"
                    )));
                }
                BranchName::Contributor(_) => {}
            }

            let mut batch = WriteBatch::new();
            let parent = match self.store.branch_head(proposal_id, &branch)? {
                Some(head) => head,
                None if branch.is_main() => {
                    return Err(VcsError::BranchNotFound(format!("{proposal_id}/{branch}")));
                }
                None => {
                    let fork = self.main_head(proposal_id)?;
                    batch.set_branch(proposal_id, branch, None, fork);
                    fork
                }
            };

            if graph::content_at(self.store.as_ref(), &parent)? == new_content {
                return Err(VcsError::Validation("content is unchanged".into()));
            }

            let blob = Blob::new(new_content);
            let commit = Commit::new(proposal_id, &[parent], blob.id, contributor_id, message);
            batch
                .put_blob(blob)
                .put_commit(commit.clone())
                .set_branch(proposal_id, branch, Some(parent), commit.id);

            proposal.bump_stat(stats::COMMITS, 1);
            if branch.is_main() {
                proposal.head = commit.id;
            }
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(commit)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            branch = %branch,
            commit = %commit.id.short(),
            contributor_id = %contributor_id,
            "commit created"
        );
        self.outbox.notify();
        Ok(commit)
    }

    /// Diff between the contents of two commits.
    pub fn diff(&self, from: &ObjectId, to: &ObjectId) -> Result<Diff> {
        let base = graph::content_at(self.store.as_ref(), from)?;
        let new = graph::content_at(self.store.as_ref(), to)?;
        Ok(diff(&base, &new, self.options.granularity))
    }

    /// Computes a merge of `source` into `target` without writing anything.
    ///
    /// `base` must be an ancestor of both heads; [`Self::branch_merge_base`]
    /// gives the nearest one.
    pub fn prepare_merge(
        &self,
        proposal_id: ProposalId,
        source: &BranchName,
        target: &BranchName,
        base: ObjectId,
        merger: ContributorId,
        message: &str,
    ) -> Result<MergePlan> {
        let store = self.store.as_ref();
        let source_head = self.head_of(proposal_id, source)?;
        let target_head = self.head_of(proposal_id, target)?;
        graph::load_commit(store, &base)?;

        if graph::is_ancestor(store, &source_head, &target_head)? {
            return Err(VcsError::Validation(format!(
                "{source} has nothing to merge into {target}"
            )));
        }

        if !graph::is_ancestor(store, &base, &source_head)?
            || !graph::is_ancestor(store, &base, &target_head)?
        {
            return Err(VcsError::Validation(format!(
                "{} is not a common ancestor of {source} and {target}",
                base.short()
            )));
        }
        let ancestor = base;
        let fast_forward = target_head == ancestor;

        let text = if fast_forward {
            graph::content_at(store, &source_head)?
        } else {
            let ancestor_text = graph::content_at(store, &ancestor)?;
            let ours = graph::content_at(store, &target_head)?;
            let theirs = graph::content_at(store, &source_head)?;
            match merge3(&ancestor_text, &ours, &theirs, &self.options) {
                MergeOutcome::Clean(text) => text,
                MergeOutcome::Conflict(regions) => {
                    return Err(VcsError::MergeConflict { regions });
                }
            }
        };

        let blob = Blob::new(text);
        let commit = Commit::new(
            proposal_id,
            &[target_head, source_head],
            blob.id,
            merger,
            message,
        );
        Ok(MergePlan {
            proposal_id,
            source: *source,
            target: *target,
            target_head,
            source_head,
            ancestor,
            fast_forward,
            commit,
            blob,
        })
    }

    /// Merges `source` into `target` with `base` as the common ancestor.
    ///
    /// The merger needs MAINTAINER or higher. On conflict nothing is written.
    /// `cancel` is honoured until the batch is applied.
    #[allow(clippy::too_many_arguments)]
    pub fn merge(
        &self,
        proposal_id: ProposalId,
        source: BranchName,
        target: BranchName,
        base: ObjectId,
        merger: ContributorId,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<MergeResult> {
        require_message(message)?;

        let result = self.locks.with(proposal_id, || -> Result<MergeResult> {
            if cancel.is_cancelled() {
                return Err(VcsError::Cancelled);
            }
            let mut proposal = self.live_proposal(proposal_id)?;
            self.registry
                .authorize(proposal_id, merger, ContributorRole::Maintainer)?;

            let plan = self.prepare_merge(proposal_id, &source, &target, base, merger, message)?;

            let mut batch = WriteBatch::new();
            plan.stage(&mut batch);
            plan.apply_to(&mut proposal);
            let proposal = self
                .outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;

            if cancel.is_cancelled() {
                return Err(VcsError::Cancelled);
            }
            self.store.apply(batch)?;
            Ok(MergeResult {
                commit: plan.commit,
                fast_forward: plan.fast_forward,
                proposal,
            })
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            source = %source,
            target = %target,
            commit = %result.commit.id.short(),
            fast_forward = result.fast_forward,
            "branches merged"
        );
        self.outbox.notify();
        Ok(result)
    }

    /// Nearest common ancestor of two commits.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
        graph::merge_base(self.store.as_ref(), a, b)
    }

    /// Nearest common ancestor of the heads of `source` and `target`.
    pub fn branch_merge_base(
        &self,
        proposal_id: ProposalId,
        source: &BranchName,
        target: &BranchName,
    ) -> Result<ObjectId> {
        let source_head = self.head_of(proposal_id, source)?;
        let target_head = self.head_of(proposal_id, target)?;
        graph::merge_base(self.store.as_ref(), &source_head, &target_head)?.ok_or_else(|| {
            VcsError::Validation(format!("{source} and {target} share no history"))
        })
    }

    /// Returns true if `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        graph::is_ancestor(self.store.as_ref(), ancestor, descendant)
    }

    /// First-parent history of a branch, newest first.
    pub fn history(
        &self,
        proposal_id: ProposalId,
        branch: &BranchName,
        limit: usize,
    ) -> Result<Vec<Commit>> {
        let head = self.head_of(proposal_id, branch)?;
        graph::first_parent_log(self.store.as_ref(), &head, limit)
    }

    /// Full text at a commit.
    pub fn content_at(&self, commit: &ObjectId) -> Result<String> {
        graph::content_at(self.store.as_ref(), commit)
    }

    /// Gets a commit.
    pub fn commit(&self, id: &ObjectId) -> Result<Commit> {
        graph::load_commit(self.store.as_ref(), id)
    }

    /// Branches of a proposal, `main` first.
    pub fn branches(&self, proposal_id: ProposalId) -> Result<Vec<Branch>> {
        self.proposal(proposal_id)?;
        Ok(self.store.branches(proposal_id)?)
    }

    /// Head of a branch.
    pub fn branch_head(&self, proposal_id: ProposalId, branch: &BranchName) -> Result<ObjectId> {
        self.head_of(proposal_id, branch)
    }

    fn head_of(&self, proposal_id: ProposalId, branch: &BranchName) -> Result<ObjectId> {
        self.store
            .branch_head(proposal_id, branch)?
            .ok_or_else(|| VcsError::BranchNotFound(format!("{proposal_id}/{branch}")))
    }

    fn main_head(&self, proposal_id: ProposalId) -> Result<ObjectId> {
        self.head_of(proposal_id, &BranchName::Main)
    }

    pub(crate) fn proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        self.store
            .proposal(proposal_id)?
            .ok_or_else(|| VcsError::NotFound(format!("proposal {proposal_id}")))
    }

    pub(crate) fn live_proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        let proposal = self.proposal(proposal_id)?;
        if proposal.is_archived() {
            return Err(VcsError::Validation(format!(
                "proposal {proposal_id} is archived"
            )));
        }
        Ok(proposal)
    }
}

pub(crate) fn require_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(VcsError::Validation("a message is required".into()));
    }
    Ok(())
}

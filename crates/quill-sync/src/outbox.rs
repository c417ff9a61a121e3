//! Outbox staging.
//!
//! Every canonical mutation finishes by handing its proposal to
//! [`Outbox::stage_change`] before applying the batch. Staging refreshes the
//! derived fields of the proposal and enqueues the snapshot that describes
//! the post-mutation state, in the same atomic batch as the mutation itself.

use quill_storage::{NewOutboxEntry, OutboxKind, ProposalStore, WriteBatch};
use quill_types::{
    stats, ContributorStatus, Proposal, PullRequestStatus, StatusInputs, StatusPolicy,
};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::{PublishSnapshot, Result};

/// Stages publish notifications and wakes the delivery worker.
#[derive(Clone)]
pub struct Outbox {
    policy: Arc<dyn StatusPolicy>,
    notify: Arc<Notify>,
}

impl Outbox {
    /// Creates an outbox deriving statuses with `policy`.
    pub fn new(policy: Arc<dyn StatusPolicy>) -> Self {
        Self {
            policy,
            notify: Arc::new(Notify::new()),
        }
    }

    /// The configured status policy.
    pub fn policy(&self) -> &dyn StatusPolicy {
        self.policy.as_ref()
    }

    /// Finalizes a mutated proposal and enqueues its snapshot.
    ///
    /// Bumps the version, recomputes the aggregate stats and the status from
    /// the batch-overlaid state, writes the proposal into `batch` and enqueues
    /// a PUBLISH row (DELETE once archived). Returns the proposal as staged.
    pub fn stage_change(
        &self,
        store: &dyn ProposalStore,
        batch: &mut WriteBatch,
        mut proposal: Proposal,
    ) -> Result<Proposal> {
        proposal.touch();
        self.refresh(store, batch, &mut proposal)?;
        batch.put_proposal(proposal.clone());
        self.enqueue(store, batch, &proposal)?;
        Ok(proposal)
    }

    /// Enqueues a snapshot of `proposal` without changing it.
    pub fn restage(
        &self,
        store: &dyn ProposalStore,
        batch: &mut WriteBatch,
        proposal: &Proposal,
    ) -> Result<()> {
        self.enqueue(store, batch, proposal)
    }

    /// Wakes the delivery worker. Call after the batch was applied.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn refresh(
        &self,
        store: &dyn ProposalStore,
        batch: &WriteBatch,
        proposal: &mut Proposal,
    ) -> Result<()> {
        let view = batch.view(store);
        let contributors = view
            .contributors(proposal.id)?
            .iter()
            .filter(|c| c.status != ContributorStatus::Removed)
            .count();
        let pull_requests = view.pull_requests(proposal.id)?;
        let count = |status: PullRequestStatus| {
            pull_requests.iter().filter(|pr| pr.status == status).count()
        };
        let inputs = StatusInputs {
            open_pull_requests: count(PullRequestStatus::Open),
            merged_pull_requests: count(PullRequestStatus::Merged),
            ..StatusInputs::default()
        };

        proposal.set_stat(stats::CONTRIBUTORS, contributors as i64);
        proposal.set_stat(stats::OPEN_PULL_REQUESTS, inputs.open_pull_requests as i64);
        proposal.set_stat(stats::MERGED_PULL_REQUESTS, inputs.merged_pull_requests as i64);

        if let Some(previous) = proposal.reevaluate(self.policy.as_ref(), inputs) {
            tracing::info!(
                proposal_id = %proposal.id,
                from = %previous,
                to = %proposal.status(),
                "proposal status changed"
            );
        }
        Ok(())
    }

    fn enqueue(
        &self,
        store: &dyn ProposalStore,
        batch: &mut WriteBatch,
        proposal: &Proposal,
    ) -> Result<()> {
        let entry = if proposal.is_archived() {
            NewOutboxEntry {
                proposal_id: proposal.id,
                version: proposal.version,
                kind: OutboxKind::Delete,
                payload: serde_json::json!({ "id": proposal.id }),
            }
        } else {
            let snapshot = PublishSnapshot::build(&batch.view(store), proposal)?;
            NewOutboxEntry {
                proposal_id: proposal.id,
                version: proposal.version,
                kind: OutboxKind::Publish,
                payload: serde_json::to_value(&snapshot)?,
            }
        };
        tracing::debug!(
            proposal_id = %proposal.id,
            version = proposal.version,
            kind = ?entry.kind,
            "staged outbox entry"
        );
        batch.enqueue(entry);
        Ok(())
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_storage::{Blob, Commit, MemoryStore, OutboxKind};
    use quill_types::{
        BranchName, Contributor, ContributorId, ContributorRole, DefaultStatusPolicy, ProposalId,
        ProposalStatus, PullRequest, PullRequestId, UserRef,
    };

    fn seeded() -> (MemoryStore, Proposal) {
        let store = MemoryStore::new();
        let pid = ProposalId::new(1);
        let blob = Blob::new("Parks need benches.");
        let root = Commit::new(pid, &[], blob.id, ContributorId::new(1), "create");
        let proposal = Proposal::new(pid, "Benches", UserRef::new("alice", "Alice"), root.id);
        let mut batch = WriteBatch::new();
        batch
            .put_blob(blob)
            .put_commit(root.clone())
            .set_branch(pid, BranchName::Main, None, root.id)
            .put_contributor(Contributor::new(
                ContributorId::new(1),
                pid,
                "alice".into(),
                "Alice",
                ContributorRole::Owner,
                quill_types::ContributorStatus::Active,
            ));
        store.apply(batch).unwrap();
        (store, proposal)
    }

    fn outbox() -> Outbox {
        Outbox::new(Arc::new(DefaultStatusPolicy))
    }

    #[test]
    fn test_stage_change_bumps_version_and_enqueues_snapshot() {
        let (store, proposal) = seeded();
        let mut batch = WriteBatch::new();
        let staged = outbox().stage_change(&store, &mut batch, proposal).unwrap();

        assert_eq!(staged.version, 1);
        assert_eq!(staged.stat(stats::CONTRIBUTORS), 1);
        let entries = batch.outbox_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, OutboxKind::Publish);

        let snapshot: PublishSnapshot = serde_json::from_value(entries[0].payload.clone()).unwrap();
        assert_eq!(snapshot.content, "Parks need benches.");
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.contributors.len(), 1);
        assert!(snapshot.branches.is_empty());
    }

    #[test]
    fn test_status_follows_pending_pull_requests() {
        let (store, proposal) = seeded();
        let mut batch = WriteBatch::new();
        batch.put_pull_request(PullRequest::new(
            PullRequestId::new(1),
            proposal.id,
            ContributorId::new(2),
            proposal.head,
            proposal.head,
            "fix",
        ));
        let staged = outbox().stage_change(&store, &mut batch, proposal).unwrap();
        assert_eq!(staged.status(), ProposalStatus::InReview);
        assert_eq!(staged.stat(stats::OPEN_PULL_REQUESTS), 1);
    }

    #[test]
    fn test_archived_proposal_stages_delete() {
        let (store, mut proposal) = seeded();
        proposal.archive();
        let mut batch = WriteBatch::new();
        let staged = outbox().stage_change(&store, &mut batch, proposal).unwrap();
        assert_eq!(staged.status(), ProposalStatus::Archived);
        assert_eq!(batch.outbox_entries()[0].kind, OutboxKind::Delete);
    }

    #[test]
    fn test_restage_keeps_version() {
        let (store, proposal) = seeded();
        let mut batch = WriteBatch::new();
        outbox().restage(&store, &mut batch, &proposal).unwrap();
        assert_eq!(batch.outbox_entries()[0].version, proposal.version);
        assert!(batch.proposals().next().is_none());
    }
}

//! In-memory storage backend.

use parking_lot::RwLock;
use quill_types::{
    BranchName, Contributor, ContributorId, ObjectId, Proposal, ProposalId, PullRequest,
    PullRequestId, Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    Applied, Blob, Branch, Commit, IdSpace, OutboxRecord, OutboxStatus, Page, ProposalQuery,
    ProposalStore, Result, StorageError, WriteBatch,
};

#[derive(Debug, Default)]
struct Inner {
    proposals: HashMap<ProposalId, Proposal>,
    commits: HashMap<ObjectId, Commit>,
    blobs: HashMap<ObjectId, Blob>,
    branches: HashMap<ProposalId, BTreeMap<BranchName, Branch>>,
    contributors: BTreeMap<ContributorId, Contributor>,
    pull_requests: BTreeMap<PullRequestId, PullRequest>,
    outbox: BTreeMap<u64, OutboxRecord>,
    next_outbox: u64,
}

impl Inner {
    fn head(&self, proposal_id: ProposalId, name: &BranchName) -> Option<ObjectId> {
        self.branches
            .get(&proposal_id)
            .and_then(|b| b.get(name))
            .map(|b| b.head)
    }

    /// Checks every precondition of `batch` without writing.
    fn check(&self, batch: &WriteBatch) -> Result<()> {
        let mut heads: HashMap<(ProposalId, BranchName), Option<ObjectId>> = HashMap::new();
        for update in &batch.branches {
            let key = (update.proposal_id, update.name);
            let current = match heads.get(&key) {
                Some(head) => *head,
                None => self.head(update.proposal_id, &update.name),
            };
            if current != update.expected {
                return Err(StorageError::head_moved(
                    format!("{}/{}", update.proposal_id, update.name),
                    update.expected,
                    current,
                ));
            }
            heads.insert(key, Some(update.head));
        }

        for commit in &batch.commits {
            if !commit.verify() {
                return Err(StorageError::Corruption(format!(
                    "commit {} does not match its content",
                    commit.id.short()
                )));
            }
            let content_known = self.blobs.contains_key(&commit.content)
                || batch.blobs.iter().any(|b| b.id == commit.content);
            if !content_known {
                return Err(StorageError::NotFound(format!(
                    "blob {} of commit {}",
                    commit.content.short(),
                    commit.id.short()
                )));
            }
        }

        for update in &batch.branches {
            let known = self.commits.contains_key(&update.head)
                || batch.commits.iter().any(|c| c.id == update.head);
            if !known {
                return Err(StorageError::NotFound(format!(
                    "commit {} for branch {}",
                    update.head.short(),
                    update.name
                )));
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory [`ProposalStore`].
///
/// All state sits behind one lock, so a batch is applied atomically with
/// respect to every reader.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    next_proposal: AtomicU64,
    next_contributor: AtomicU64,
    next_pull_request: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outbox rows, pending and failed.
    pub fn outbox_len(&self) -> usize {
        self.inner.read().outbox.len()
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> usize {
        self.inner.read().commits.len()
    }
}

impl ProposalStore for MemoryStore {
    fn next_id(&self, space: IdSpace) -> Result<u64> {
        let counter = match space {
            IdSpace::Proposal => &self.next_proposal,
            IdSpace::Contributor => &self.next_contributor,
            IdSpace::PullRequest => &self.next_pull_request,
        };
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn apply(&self, batch: WriteBatch) -> Result<Applied> {
        let mut inner = self.inner.write();
        inner.check(&batch)?;

        let WriteBatch {
            proposals,
            commits,
            blobs,
            branches,
            contributors,
            pull_requests,
            outbox,
        } = batch;

        for blob in blobs {
            inner.blobs.entry(blob.id).or_insert(blob);
        }
        for commit in commits {
            inner.commits.entry(commit.id).or_insert(commit);
        }
        let now = Timestamp::now();
        for update in branches {
            let table = inner.branches.entry(update.proposal_id).or_default();
            match table.get_mut(&update.name) {
                Some(branch) => {
                    branch.head = update.head;
                    branch.updated_at = now;
                }
                None => {
                    table.insert(
                        update.name,
                        Branch {
                            proposal_id: update.proposal_id,
                            name: update.name,
                            head: update.head,
                            forked_from: update.head,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
        for (id, proposal) in proposals {
            inner.proposals.insert(id, proposal);
        }
        for (id, contributor) in contributors {
            inner.contributors.insert(id, contributor);
        }
        for (id, pull_request) in pull_requests {
            inner.pull_requests.insert(id, pull_request);
        }

        let mut outbox_ids = Vec::with_capacity(outbox.len());
        for entry in outbox {
            inner.next_outbox += 1;
            let id = inner.next_outbox;
            inner.outbox.insert(id, OutboxRecord::from_entry(id, entry));
            outbox_ids.push(id);
        }

        tracing::trace!(outbox = outbox_ids.len(), "batch applied");
        Ok(Applied { outbox_ids })
    }

    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        Ok(self.inner.read().proposals.get(&id).cloned())
    }

    fn list_proposals(&self, query: &ProposalQuery) -> Result<Page<Proposal>> {
        let snapshot: Vec<Proposal> = self.inner.read().proposals.values().cloned().collect();
        query.execute(snapshot)
    }

    fn commit(&self, id: &ObjectId) -> Result<Option<Commit>> {
        Ok(self.inner.read().commits.get(id).cloned())
    }

    fn blob(&self, id: &ObjectId) -> Result<Option<Blob>> {
        Ok(self.inner.read().blobs.get(id).cloned())
    }

    fn branch(&self, proposal_id: ProposalId, name: &BranchName) -> Result<Option<Branch>> {
        Ok(self
            .inner
            .read()
            .branches
            .get(&proposal_id)
            .and_then(|b| b.get(name))
            .cloned())
    }

    fn branches(&self, proposal_id: ProposalId) -> Result<Vec<Branch>> {
        // BranchName orders `Main` first.
        Ok(self
            .inner
            .read()
            .branches
            .get(&proposal_id)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default())
    }

    fn contributor(&self, id: ContributorId) -> Result<Option<Contributor>> {
        Ok(self.inner.read().contributors.get(&id).cloned())
    }

    fn contributors(&self, proposal_id: ProposalId) -> Result<Vec<Contributor>> {
        Ok(self
            .inner
            .read()
            .contributors
            .values()
            .filter(|c| c.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    fn pull_request(&self, id: PullRequestId) -> Result<Option<PullRequest>> {
        Ok(self.inner.read().pull_requests.get(&id).cloned())
    }

    fn pull_requests(&self, proposal_id: ProposalId) -> Result<Vec<PullRequest>> {
        Ok(self
            .inner
            .read()
            .pull_requests
            .values()
            .filter(|pr| pr.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        Ok(self
            .inner
            .read()
            .outbox
            .values()
            .filter(|r| r.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    fn failed_outbox(&self) -> Result<Vec<OutboxRecord>> {
        Ok(self
            .inner
            .read()
            .outbox
            .values()
            .filter(|r| r.status == OutboxStatus::Failed)
            .cloned()
            .collect())
    }

    fn outbox_record(&self, id: u64) -> Result<Option<OutboxRecord>> {
        Ok(self.inner.read().outbox.get(&id).cloned())
    }

    fn ack_outbox(&self, id: u64) -> Result<bool> {
        Ok(self.inner.write().outbox.remove(&id).is_some())
    }

    fn record_outbox_failure(&self, id: u64, error: &str, give_up: bool) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("outbox row {id}")))?;
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.updated_at = Timestamp::now();
        if give_up {
            record.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    fn requeue_outbox(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("outbox row {id}")))?;
        record.status = OutboxStatus::Pending;
        record.attempts = 0;
        record.updated_at = Timestamp::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewOutboxEntry, OutboxKind};
    use quill_types::UserRef;

    fn root(proposal: u64) -> (Blob, Commit) {
        let blob = Blob::new("first draft");
        let commit = Commit::new(
            ProposalId::new(proposal),
            &[],
            blob.id,
            ContributorId::new(1),
            "create",
        );
        (blob, commit)
    }

    fn create(store: &MemoryStore, id: u64) -> Commit {
        let (blob, commit) = root(id);
        let pid = ProposalId::new(id);
        let mut batch = WriteBatch::new();
        batch
            .put_blob(blob)
            .put_commit(commit.clone())
            .set_branch(pid, BranchName::Main, None, commit.id)
            .put_proposal(Proposal::new(pid, "Title", UserRef::new("alice", "Alice"), commit.id))
            .enqueue(NewOutboxEntry {
                proposal_id: pid,
                version: 1,
                kind: OutboxKind::Publish,
                payload: serde_json::json!({"id": id}),
            });
        store.apply(batch).unwrap();
        commit
    }

    #[test]
    fn test_ids_are_monotonic_per_space() {
        let store = MemoryStore::new();
        assert_eq!(store.next_id(IdSpace::Proposal).unwrap(), 1);
        assert_eq!(store.next_id(IdSpace::Proposal).unwrap(), 2);
        assert_eq!(store.next_id(IdSpace::PullRequest).unwrap(), 1);
    }

    #[test]
    fn test_apply_writes_everything() {
        let store = MemoryStore::new();
        let commit = create(&store, 1);
        let pid = ProposalId::new(1);

        assert!(store.proposal(pid).unwrap().is_some());
        assert_eq!(store.branch_head(pid, &BranchName::Main).unwrap(), Some(commit.id));
        assert_eq!(store.pending_outbox(10).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_head_rejects_whole_batch() {
        let store = MemoryStore::new();
        let root = create(&store, 1);
        let pid = ProposalId::new(1);

        let blob = Blob::new("edit");
        let next = Commit::new(pid, &[root.id], blob.id, ContributorId::new(1), "edit");
        let mut batch = WriteBatch::new();
        batch
            .put_blob(blob)
            .put_commit(next.clone())
            // Claims main is still unset.
            .set_branch(pid, BranchName::Main, None, next.id)
            .enqueue(NewOutboxEntry {
                proposal_id: pid,
                version: 2,
                kind: OutboxKind::Publish,
                payload: serde_json::Value::Null,
            });

        let err = store.apply(batch).unwrap_err();
        assert!(matches!(err, StorageError::HeadMoved { .. }));
        assert!(store.commit(&next.id).unwrap().is_none());
        assert_eq!(store.branch_head(pid, &BranchName::Main).unwrap(), Some(root.id));
        assert_eq!(store.outbox_len(), 1);
    }

    #[test]
    fn test_branch_head_needs_known_commit() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set_branch(ProposalId::new(1), BranchName::Main, None, ObjectId::from_bytes([9; 32]));
        assert!(matches!(store.apply(batch), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_outbox_failure_and_requeue() {
        let store = MemoryStore::new();
        create(&store, 1);
        let id = store.pending_outbox(1).unwrap()[0].id;

        store.record_outbox_failure(id, "timeout", false).unwrap();
        let row = store.outbox_record(id).unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.status, OutboxStatus::Pending);

        store.record_outbox_failure(id, "bad schema", true).unwrap();
        assert!(store.pending_outbox(10).unwrap().is_empty());
        assert_eq!(store.failed_outbox().unwrap().len(), 1);

        store.requeue_outbox(id).unwrap();
        let row = store.outbox_record(id).unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 0);
        assert_eq!(row.last_error.as_deref(), Some("bad schema"));

        assert!(store.ack_outbox(id).unwrap());
        assert!(!store.ack_outbox(id).unwrap());
    }

    #[test]
    fn test_branches_list_main_first() {
        let store = MemoryStore::new();
        let root = create(&store, 1);
        let pid = ProposalId::new(1);
        let mut batch = WriteBatch::new();
        batch.set_branch(pid, BranchName::Contributor(ContributorId::new(7)), None, root.id);
        store.apply(batch).unwrap();

        let names: Vec<String> = store
            .branches(pid)
            .unwrap()
            .iter()
            .map(|b| b.name.to_string())
            .collect();
        assert_eq!(names, vec!["main", "contributor/7"]);
    }
}

//! Contributor registry.

use quill_storage::{IdSpace, ProposalLocks, ProposalStore, WriteBatch};
use quill_sync::Outbox;
use quill_types::{
    Contributor, ContributorId, ContributorRole, ContributorStatus, Proposal, ProposalId,
    PullRequestStatus, UserId, UserRef,
};
use std::sync::Arc;

use crate::{RegistryError, Result};

/// Tracks who may act on a proposal, and with which role.
pub struct ContributorRegistry {
    store: Arc<dyn ProposalStore>,
    locks: Arc<ProposalLocks>,
    outbox: Outbox,
}

impl ContributorRegistry {
    /// Create a new registry.
    pub fn new(store: Arc<dyn ProposalStore>, locks: Arc<ProposalLocks>, outbox: Outbox) -> Self {
        Self {
            store,
            locks,
            outbox,
        }
    }

    /// Adds an ACTIVE contributor.
    pub fn add_contributor(
        &self,
        proposal_id: ProposalId,
        user: UserRef,
        role: ContributorRole,
    ) -> Result<Contributor> {
        self.enroll(proposal_id, user, role, ContributorStatus::Active)
    }

    /// Adds a PENDING contributor who must accept before acting.
    pub fn invite_contributor(
        &self,
        proposal_id: ProposalId,
        user: UserRef,
        role: ContributorRole,
    ) -> Result<Contributor> {
        self.enroll(proposal_id, user, role, ContributorStatus::Pending)
    }

    fn enroll(
        &self,
        proposal_id: ProposalId,
        user: UserRef,
        role: ContributorRole,
        status: ContributorStatus,
    ) -> Result<Contributor> {
        let contributor = self.locks.with(proposal_id, || -> Result<Contributor> {
            let proposal = self.live_proposal(proposal_id)?;
            if self.find_by_user(proposal_id, &user.id)?.is_some() {
                return Err(RegistryError::DuplicateContributor {
                    user: user.id.to_string(),
                    proposal: proposal_id.to_string(),
                });
            }

            let contributor = self.new_contributor(proposal_id, &user, role, status)?;
            let mut batch = WriteBatch::new();
            batch.put_contributor(contributor.clone());
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(contributor)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            contributor_id = %contributor.id,
            user = %contributor.user_id,
            role = %contributor.role,
            status = ?contributor.status,
            "contributor enrolled"
        );
        self.outbox.notify();
        Ok(contributor)
    }

    /// Builds a contributor record with a fresh id, without storing it.
    ///
    /// Used by components that enroll contributors as part of their own batch.
    pub fn new_contributor(
        &self,
        proposal_id: ProposalId,
        user: &UserRef,
        role: ContributorRole,
        status: ContributorStatus,
    ) -> Result<Contributor> {
        let id = ContributorId::new(self.store.next_id(IdSpace::Contributor)?);
        Ok(Contributor::new(
            id,
            proposal_id,
            user.id.clone(),
            user.name.clone(),
            role,
            status,
        ))
    }

    /// Activates a PENDING contributor. Only the invited user may accept.
    pub fn accept_invitation(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
        user: &UserId,
    ) -> Result<Contributor> {
        let contributor = self.locks.with(proposal_id, || -> Result<Contributor> {
            let proposal = self.live_proposal(proposal_id)?;
            let mut contributor = self.member(proposal_id, contributor_id)?;
            if &contributor.user_id != user {
                return Err(RegistryError::Unauthorized(format!(
                    "invitation {contributor_id} belongs to another user"
                )));
            }
            contributor.activate()?;

            let mut batch = WriteBatch::new();
            batch.put_contributor(contributor.clone());
            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok(contributor)
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            contributor_id = %contributor_id,
            "invitation accepted"
        );
        self.outbox.notify();
        Ok(contributor)
    }

    /// Marks a contributor REMOVED.
    ///
    /// Their branch and commits stay; their OPEN and STALE pull requests are
    /// closed in the same batch. The proposal owner cannot be removed.
    pub fn remove_contributor(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
    ) -> Result<Contributor> {
        let (contributor, closed) = self.locks.with(proposal_id, || -> Result<_> {
            let proposal = self.live_proposal(proposal_id)?;
            let mut contributor = self.member(proposal_id, contributor_id)?;
            if contributor.user_id == proposal.owner.id {
                return Err(RegistryError::Validation(
                    "the proposal owner cannot be removed".into(),
                ));
            }
            contributor.remove()?;

            let mut batch = WriteBatch::new();
            batch.put_contributor(contributor.clone());

            let mut closed = 0;
            for mut pr in self.store.pull_requests(proposal_id)? {
                let withdrawable = matches!(
                    pr.status,
                    PullRequestStatus::Open | PullRequestStatus::Stale
                );
                if pr.author == contributor_id && withdrawable {
                    pr.close(contributor_id)?;
                    batch.put_pull_request(pr);
                    closed += 1;
                }
            }

            self.outbox
                .stage_change(self.store.as_ref(), &mut batch, proposal)?;
            self.store.apply(batch)?;
            Ok((contributor, closed))
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            contributor_id = %contributor_id,
            closed_pull_requests = closed,
            "contributor removed"
        );
        self.outbox.notify();
        Ok(contributor)
    }

    /// Returns true if the contributor belongs to the proposal and is ACTIVE.
    pub fn is_active_contributor(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
    ) -> Result<bool> {
        Ok(self
            .store
            .contributor(contributor_id)?
            .is_some_and(|c| c.proposal_id == proposal_id && c.is_active()))
    }

    /// Checks that a contributor is ACTIVE on the proposal with at least
    /// `required`, returning the record.
    pub fn authorize(
        &self,
        proposal_id: ProposalId,
        contributor_id: ContributorId,
        required: ContributorRole,
    ) -> Result<Contributor> {
        let contributor = self.member(proposal_id, contributor_id)?;
        if !contributor.is_active() {
            return Err(RegistryError::Unauthorized(format!(
                "contributor {contributor_id} is not active"
            )));
        }
        if !contributor.role.has(required) {
            return Err(RegistryError::Unauthorized(format!(
                "contributor {contributor_id} is {} but {required} is required",
                contributor.role
            )));
        }
        Ok(contributor)
    }

    /// Get a contributor.
    pub fn get(&self, contributor_id: ContributorId) -> Result<Contributor> {
        self.store
            .contributor(contributor_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("contributor {contributor_id}")))
    }

    /// List a proposal's contributors, removed ones included.
    pub fn list(&self, proposal_id: ProposalId) -> Result<Vec<Contributor>> {
        if self.store.proposal(proposal_id)?.is_none() {
            return Err(RegistryError::NotFound(format!("proposal {proposal_id}")));
        }
        Ok(self.store.contributors(proposal_id)?)
    }

    /// The user's non-removed contributor record on a proposal.
    pub fn find_by_user(&self, proposal_id: ProposalId, user: &UserId) -> Result<Option<Contributor>> {
        Ok(self
            .store
            .contributors(proposal_id)?
            .into_iter()
            .find(|c| &c.user_id == user && c.is_live()))
    }

    fn member(&self, proposal_id: ProposalId, contributor_id: ContributorId) -> Result<Contributor> {
        self.store
            .contributor(contributor_id)?
            .filter(|c| c.proposal_id == proposal_id)
            .ok_or_else(|| {
                RegistryError::NotFound(format!("contributor {contributor_id} on {proposal_id}"))
            })
    }

    fn live_proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        let proposal = self
            .store
            .proposal(proposal_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {proposal_id}")))?;
        if proposal.is_archived() {
            return Err(RegistryError::Validation(format!(
                "proposal {proposal_id} is archived"
            )));
        }
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_storage::{Blob, Commit, MemoryStore};
    use quill_types::{
        stats, BranchName, DefaultStatusPolicy, ErrorKind, PullRequest, PullRequestId,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: ContributorRegistry,
        pid: ProposalId,
        owner: ContributorId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::new(Arc::new(DefaultStatusPolicy));
        let registry =
            ContributorRegistry::new(store.clone(), Arc::new(ProposalLocks::new()), outbox.clone());

        let pid = ProposalId::new(1);
        let alice = UserRef::new("alice", "Alice");
        let owner = registry
            .new_contributor(pid, &alice, ContributorRole::Owner, ContributorStatus::Active)
            .unwrap();
        let blob = Blob::new("text");
        let root = Commit::new(pid, &[], blob.id, owner.id, "create");
        let mut batch = WriteBatch::new();
        batch
            .put_blob(blob)
            .put_commit(root.clone())
            .set_branch(pid, BranchName::Main, None, root.id)
            .put_contributor(owner.clone());
        outbox
            .stage_change(
                store.as_ref(),
                &mut batch,
                Proposal::new(pid, "Benches", alice, root.id),
            )
            .unwrap();
        store.apply(batch).unwrap();

        Fixture {
            store,
            registry,
            pid,
            owner: owner.id,
        }
    }

    fn bob() -> UserRef {
        UserRef::new("bob", "Bob")
    }

    #[test]
    fn test_add_contributor_and_duplicate() {
        let fx = fixture();
        let c = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();
        assert!(fx.registry.is_active_contributor(fx.pid, c.id).unwrap());

        let err = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Maintainer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateContributor);

        let proposal = fx.store.proposal(fx.pid).unwrap().unwrap();
        assert_eq!(proposal.stat(stats::CONTRIBUTORS), 2);
        assert_eq!(proposal.version, 2);
    }

    #[test]
    fn test_removed_user_can_rejoin() {
        let fx = fixture();
        let c = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();
        fx.registry.remove_contributor(fx.pid, c.id).unwrap();
        assert!(!fx.registry.is_active_contributor(fx.pid, c.id).unwrap());

        let again = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();
        assert_ne!(again.id, c.id);
        assert_eq!(fx.registry.list(fx.pid).unwrap().len(), 3);
    }

    #[test]
    fn test_invitation_flow() {
        let fx = fixture();
        let invited = fx
            .registry
            .invite_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();
        assert!(!fx.registry.is_active_contributor(fx.pid, invited.id).unwrap());

        let err = fx
            .registry
            .accept_invitation(fx.pid, invited.id, &UserId::new("mallory"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let active = fx
            .registry
            .accept_invitation(fx.pid, invited.id, &UserId::new("bob"))
            .unwrap();
        assert_eq!(active.status, ContributorStatus::Active);

        let twice = fx
            .registry
            .accept_invitation(fx.pid, invited.id, &UserId::new("bob"))
            .unwrap_err();
        assert_eq!(twice.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_owner_cannot_be_removed() {
        let fx = fixture();
        let err = fx.registry.remove_contributor(fx.pid, fx.owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_removal_closes_open_pull_requests() {
        let fx = fixture();
        let c = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();

        let head = fx.store.proposal(fx.pid).unwrap().unwrap().head;
        let pr = PullRequest::new(PullRequestId::new(1), fx.pid, c.id, head, head, "draft");
        let mut batch = WriteBatch::new();
        batch.put_pull_request(pr);
        fx.store.apply(batch).unwrap();

        fx.registry.remove_contributor(fx.pid, c.id).unwrap();
        let pr = fx.store.pull_request(PullRequestId::new(1)).unwrap().unwrap();
        assert_eq!(pr.status, PullRequestStatus::Closed);
        let proposal = fx.store.proposal(fx.pid).unwrap().unwrap();
        assert_eq!(proposal.stat(stats::OPEN_PULL_REQUESTS), 0);
    }

    #[test]
    fn test_authorize_checks_role_and_status() {
        let fx = fixture();
        let editor = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap();

        assert!(fx
            .registry
            .authorize(fx.pid, editor.id, ContributorRole::Editor)
            .is_ok());
        let err = fx
            .registry
            .authorize(fx.pid, editor.id, ContributorRole::Maintainer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(fx
            .registry
            .authorize(fx.pid, fx.owner, ContributorRole::Maintainer)
            .is_ok());

        let err = fx
            .registry
            .authorize(ProposalId::new(9), editor.id, ContributorRole::Editor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_archived_proposal_is_frozen() {
        let fx = fixture();
        let mut proposal = fx.store.proposal(fx.pid).unwrap().unwrap();
        proposal.archive();
        let mut batch = WriteBatch::new();
        batch.put_proposal(proposal);
        fx.store.apply(batch).unwrap();

        let err = fx
            .registry
            .add_contributor(fx.pid, bob(), ContributorRole::Editor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

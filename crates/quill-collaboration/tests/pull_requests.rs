//! Pull request lifecycle over the memory store.

use std::sync::Arc;

use quill_collaboration::{CollaborationError, PullRequestManager};
use quill_registry::ContributorRegistry;
use quill_storage::{MemoryStore, ProposalLocks};
use quill_sync::Outbox;
use quill_types::{
    stats, BranchName, ContributorId, ContributorRole, DefaultStatusPolicy, ErrorKind, ObjectId,
    ProposalId, ProposalStatus, PullRequestId, PullRequestStatus, UserId, UserRef,
};
use quill_vcs::{MergeOptions, VersionControlEngine};

const R0: &str = "Title\nIntro line.\nMiddle line.\nClosing line.\n";

struct Harness {
    registry: Arc<ContributorRegistry>,
    engine: Arc<VersionControlEngine>,
    prs: PullRequestManager,
    pid: ProposalId,
    owner: ContributorId,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(ProposalLocks::new());
        let outbox = Outbox::new(Arc::new(DefaultStatusPolicy));
        let registry = Arc::new(ContributorRegistry::new(
            store.clone(),
            locks.clone(),
            outbox.clone(),
        ));
        let engine = Arc::new(VersionControlEngine::new(
            store.clone(),
            locks.clone(),
            outbox.clone(),
            registry.clone(),
            MergeOptions::default(),
        ));
        let prs = PullRequestManager::new(store, locks, outbox, registry.clone(), engine.clone());

        let proposal = engine
            .create_proposal(UserRef::new("olivia", "Olivia"), "Plan", R0, "initial")
            .unwrap();
        let owner = registry
            .find_by_user(proposal.id, &UserId::from("olivia"))
            .unwrap()
            .unwrap()
            .id;
        Self {
            registry,
            engine,
            prs,
            pid: proposal.id,
            owner,
        }
    }

    fn join(&self, user: &str, role: ContributorRole) -> ContributorId {
        self.registry
            .add_contributor(self.pid, UserRef::new(user, user), role)
            .unwrap()
            .id
    }

    fn edit(&self, who: ContributorId, from: &str, to: &str) -> ObjectId {
        let current = self
            .engine
            .branch_head(self.pid, &BranchName::Contributor(who))
            .map(|head| self.engine.content_at(&head).unwrap())
            .unwrap_or_else(|_| R0.to_string());
        self.engine
            .create_commit(
                self.pid,
                BranchName::Contributor(who),
                who,
                &current.replace(from, to),
                "edit",
            )
            .unwrap()
            .id
    }

    fn main_head(&self) -> ObjectId {
        self.engine.branch_head(self.pid, &BranchName::Main).unwrap()
    }

    fn main_text(&self) -> String {
        self.engine.content_at(&self.main_head()).unwrap()
    }

    fn status(&self) -> ProposalStatus {
        self.engine.get_proposal(self.pid).unwrap().status()
    }
}

#[test]
fn test_second_pull_request_against_same_base_goes_stale() {
    let h = Harness::new();
    let r0 = h.main_head();
    assert_eq!(h.status(), ProposalStatus::Draft);

    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);
    let a1 = h.edit(a, "Intro line.", "Better intro.");
    let b1 = h.edit(b, "Closing line.", "Better closing.");

    let pr1 = h.prs.open(h.pid, a, "sharper intro").unwrap();
    assert_eq!(pr1.base_commit, r0);
    assert_eq!(pr1.source_commit, a1);
    assert_eq!(h.status(), ProposalStatus::InReview);

    let pr2 = h.prs.open(h.pid, b, "sharper closing").unwrap();
    assert_eq!(pr2.base_commit, r0);
    assert_eq!(pr2.source_commit, b1);

    let merged = h.prs.merge(pr1.id, h.owner, "take intro").unwrap();
    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(merged.merged_by, Some(h.owner));
    let m1 = merged.merge_commit.unwrap();
    assert_eq!(h.main_head(), m1);
    assert_eq!(h.engine.commit(&m1).unwrap().parents.as_slice(), &[r0, a1]);
    // PR2 is still open
    assert_eq!(h.status(), ProposalStatus::InReview);

    let err = h.prs.merge(pr2.id, h.owner, "take closing").unwrap_err();
    assert!(matches!(err, CollaborationError::StalePullRequest { .. }));
    assert_eq!(err.kind(), ErrorKind::StalePullRequest);

    assert_eq!(h.prs.get(pr2.id).unwrap().status, PullRequestStatus::Stale);
    assert_eq!(h.main_head(), m1);
    assert_eq!(h.main_text(), R0.replace("Intro line.", "Better intro."));

    let proposal = h.engine.get_proposal(h.pid).unwrap();
    assert_eq!(proposal.status(), ProposalStatus::Merged);
    assert_eq!(proposal.stat(stats::OPEN_PULL_REQUESTS), 0);
    assert_eq!(proposal.stat(stats::MERGED_PULL_REQUESTS), 1);

    // a stale pull request keeps failing and can only be closed
    let err = h.prs.merge(pr2.id, h.owner, "again").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StalePullRequest);
    let closed = h.prs.close(pr2.id, b).unwrap();
    assert_eq!(closed.status, PullRequestStatus::Closed);
    assert_eq!(closed.closed_by, Some(b));

    // reopening against the new main merges both edits
    let pr3 = h.prs.open(h.pid, b, "rebased").unwrap();
    assert_eq!(pr3.base_commit, m1);
    h.prs.merge(pr3.id, h.owner, "take closing").unwrap();
    assert_eq!(
        h.main_text(),
        "Title\nBetter intro.\nMiddle line.\nBetter closing.\n"
    );
}

#[test]
fn test_conflicting_pull_request_stays_open() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);
    h.edit(a, "Middle line.", "Ana's middle.");
    h.edit(b, "Middle line.", "Ben's middle.");

    let pr1 = h.prs.open(h.pid, a, "a").unwrap();
    h.prs.merge(pr1.id, h.owner, "a").unwrap();
    let head = h.main_head();

    let pr2 = h.prs.open(h.pid, b, "b").unwrap();
    let err = h.prs.merge(pr2.id, h.owner, "b").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MergeConflict);
    let regions = err.conflicts().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].base, "Middle line.\n");
    assert_eq!(regions[0].ours, "Ana's middle.\n");
    assert_eq!(regions[0].theirs, "Ben's middle.\n");

    assert_eq!(h.prs.get(pr2.id).unwrap().status, PullRequestStatus::Open);
    assert_eq!(h.main_head(), head);
}

#[test]
fn test_open_rules() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);

    // no working branch yet
    let err = h.prs.open(h.pid, a, "nothing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.edit(a, "Intro line.", "New intro.");
    let pr = h.prs.open(h.pid, a, "first").unwrap();
    let err = h.prs.open(h.pid, a, "second").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    h.prs.merge(pr.id, h.owner, "merge").unwrap();
    // branch is now contained in main
    let err = h.prs.open(h.pid, a, "again").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let pending = h
        .registry
        .invite_contributor(h.pid, UserRef::new("pat", "Pat"), ContributorRole::Editor)
        .unwrap();
    let err = h.prs.open(h.pid, pending.id, "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn test_merge_requires_maintainer_and_open_state() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    let m = h.join("max", ContributorRole::Maintainer);
    h.edit(a, "Intro line.", "New intro.");
    let pr = h.prs.open(h.pid, a, "pr").unwrap();

    let err = h.prs.merge(pr.id, a, "self merge").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.prs.get(pr.id).unwrap().status, PullRequestStatus::Open);

    let err = h.prs.merge(pr.id, m, " ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    h.prs.merge(pr.id, m, "ok").unwrap();
    let err = h.prs.merge(pr.id, m, "twice").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let err = h.prs.close(pr.id, a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn test_close_permissions() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Maintainer);
    h.edit(a, "Intro line.", "New intro.");
    let pr = h.prs.open(h.pid, a, "pr").unwrap();

    let err = h.prs.close(pr.id, b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let closed = h.prs.close(pr.id, h.owner).unwrap();
    assert_eq!(closed.status, PullRequestStatus::Closed);
    assert_eq!(closed.closed_by, Some(h.owner));
    assert_eq!(h.status(), ProposalStatus::Draft);
}

#[test]
fn test_removed_contributor_pull_requests_are_closed() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    h.edit(a, "Intro line.", "New intro.");
    let pr = h.prs.open(h.pid, a, "pr").unwrap();

    h.registry.remove_contributor(h.pid, a).unwrap();
    let pr = h.prs.get(pr.id).unwrap();
    assert_eq!(pr.status, PullRequestStatus::Closed);
    assert_eq!(pr.closed_by, Some(a));

    // history survives removal
    assert!(h
        .engine
        .branch_head(h.pid, &BranchName::Contributor(a))
        .is_ok());
}

#[test]
fn test_review_diff_and_listing() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);
    h.edit(a, "Intro line.", "New intro.");
    h.edit(b, "Closing line.", "New closing.");
    let pr_a = h.prs.open(h.pid, a, "a").unwrap();
    let pr_b = h.prs.open(h.pid, b, "b").unwrap();

    // later commits on the branch show up in the review
    h.edit(a, "Closing line.", "Closing for ana.");
    let diff = h.prs.review_diff(pr_a.id).unwrap();
    assert_eq!(diff.hunks.len(), 2);
    assert_eq!((diff.insertions, diff.deletions), (2, 2));

    h.prs.close(pr_b.id, b).unwrap();
    let all = h.prs.list(h.pid, None).unwrap();
    assert_eq!(all.len(), 2);
    let open = h.prs.list(h.pid, Some(PullRequestStatus::Open)).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, pr_a.id);

    let err = h.prs.get(PullRequestId::new(404)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h.prs.list(ProposalId::new(404), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_author_follow_up_after_merge_is_clean() {
    let h = Harness::new();
    let a = h.join("ann", ContributorRole::Editor);
    h.edit(a, "Intro line.", "Intro by Ann.");
    let pr1 = h.prs.open(h.pid, a, "intro").unwrap();
    h.prs.merge(pr1.id, h.owner, "intro").unwrap();

    // the same line again, on top of the already merged edit
    h.edit(a, "Intro by Ann.", "Intro by Ann, revised.");
    let pr2 = h.prs.open(h.pid, a, "revise intro").unwrap();
    let merged = h.prs.merge(pr2.id, h.owner, "revise intro").unwrap();

    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(h.main_text(), R0.replace("Intro line.", "Intro by Ann, revised."));
}

#[test]
fn test_neighbouring_line_edits_merge() {
    let h = Harness::new();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);
    h.edit(a, "Intro line.", "Ana's intro.");
    h.edit(b, "Middle line.", "Ben's middle.");

    let pr1 = h.prs.open(h.pid, a, "a").unwrap();
    h.prs.merge(pr1.id, h.owner, "a").unwrap();
    let pr2 = h.prs.open(h.pid, b, "b").unwrap();
    h.prs.merge(pr2.id, h.owner, "b").unwrap();

    assert_eq!(
        h.main_text(),
        "Title\nAna's intro.\nBen's middle.\nClosing line.\n"
    );
}

#[test]
fn test_repeated_review_rounds_keep_both_edit_sets() {
    let h = Harness::new();
    let r0 = h.main_head();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);

    let mut intro = "Intro line.".to_string();
    let mut closing = "Closing line.".to_string();
    for round in 1..=4 {
        let next_intro = format!("Intro, take {round}.");
        let next_closing = format!("Closing, take {round}.");
        h.edit(a, &intro, &next_intro);
        h.edit(b, &closing, &next_closing);
        intro = next_intro;
        closing = next_closing;

        let order = if round % 2 == 0 { [b, a] } else { [a, b] };
        for who in order {
            let pr = h.prs.open(h.pid, who, "round").unwrap();
            h.prs.merge(pr.id, h.owner, "round").unwrap();
        }

        assert_eq!(
            h.main_text(),
            format!("Title\n{intro}\nMiddle line.\n{closing}\n")
        );
        let diff = h.engine.diff(&r0, &h.main_head()).unwrap();
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!((diff.insertions, diff.deletions), (2, 2));
    }
}

#[test]
fn test_concurrent_merges_are_serialized() {
    let h = Harness::new();
    let r0 = h.main_head();
    let a = h.join("ana", ContributorRole::Editor);
    let b = h.join("ben", ContributorRole::Editor);
    h.edit(a, "Intro line.", "Ana's intro.");
    h.edit(b, "Closing line.", "Ben's closing.");
    let pr_a = h.prs.open(h.pid, a, "a").unwrap();
    let pr_b = h.prs.open(h.pid, b, "b").unwrap();

    let h = &h;
    let results = std::thread::scope(|scope| {
        let handles: Vec<_> = [pr_a.id, pr_b.id]
            .into_iter()
            .map(|id| scope.spawn(move || h.prs.merge(id, h.owner, "race")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let merged: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(merged.len(), 1);
    let stale = results.iter().filter(|r| {
        matches!(r, Err(e) if e.kind() == ErrorKind::StalePullRequest)
    });
    assert_eq!(stale.count(), 1);

    let winner = merged[0];
    let head = h.main_head();
    assert_eq!(winner.merge_commit, Some(head));
    assert_eq!(h.engine.commit(&head).unwrap().parents[0], r0);
    let expected = if winner.id == pr_a.id {
        R0.replace("Intro line.", "Ana's intro.")
    } else {
        R0.replace("Closing line.", "Ben's closing.")
    };
    assert_eq!(h.main_text(), expected);
}

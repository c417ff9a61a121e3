//! Proposal records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{ContributorId, ObjectId, ProposalId, StatusInputs, StatusPolicy, Timestamp, UserId};

/// Keys of the aggregate stats map.
pub mod stats {
    /// Number of commits recorded across all branches.
    pub const COMMITS: &str = "commits";
    /// Number of live (non-removed) contributors.
    pub const CONTRIBUTORS: &str = "contributors";
    /// Number of open pull requests.
    pub const OPEN_PULL_REQUESTS: &str = "open_pull_requests";
    /// Number of merged pull requests.
    pub const MERGED_PULL_REQUESTS: &str = "merged_pull_requests";
    /// Sum of all votes; the search index orders by this score.
    pub const VOTES: &str = "votes";
}

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Being written; nothing merged yet.
    Draft,
    /// At least one pull request is open.
    InReview,
    /// Contributions have been merged into `main`.
    Merged,
    /// Frozen by the owner.
    Archived,
}

impl ProposalStatus {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "IN_REVIEW" => Some(Self::InReview),
            "MERGED" => Some(Self::Merged),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::InReview => write!(f, "IN_REVIEW"),
            Self::Merged => write!(f, "MERGED"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// A user reference with a display name, as handed over by the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// External user id.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

impl UserRef {
    /// Creates a user reference.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One entry of the title audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleChange {
    /// Title before the change.
    pub previous: String,
    /// Title after the change.
    pub title: String,
    /// Contributor who changed it.
    pub changed_by: ContributorId,
    /// Explanation supplied with the change.
    pub message: String,
    /// When the change happened.
    pub changed_at: Timestamp,
}

/// Canonical metadata of a proposal.
///
/// The content itself lives in the commit graph; `head` points at the current
/// head of `main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique id.
    pub id: ProposalId,
    /// Current title.
    pub title: String,
    /// Owning user.
    pub owner: UserRef,
    /// Current head of `main`.
    pub head: ObjectId,
    /// Root commit created with the proposal.
    pub root: ObjectId,
    /// Aggregate stats, see [`stats`].
    pub stats: BTreeMap<String, i64>,
    /// Votes per user, each -1, 0 or +1.
    pub votes: BTreeMap<UserId, i8>,
    /// Title audit trail, oldest first.
    pub title_history: Vec<TitleChange>,
    /// Monotonic marker bumped on every canonical mutation.
    pub version: u64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    status: ProposalStatus,
    archived: bool,
}

impl Proposal {
    /// Creates a draft proposal whose `main` points at `root`.
    pub fn new(id: ProposalId, title: impl Into<String>, owner: UserRef, root: ObjectId) -> Self {
        let now = Timestamp::now();
        let mut stats = BTreeMap::new();
        stats.insert(stats::COMMITS.to_string(), 1);
        Self {
            id,
            title: title.into(),
            owner,
            head: root,
            root,
            stats,
            votes: BTreeMap::new(),
            title_history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            status: ProposalStatus::Draft,
            archived: false,
        }
    }

    /// Current status.
    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    /// Returns true once the owner archived the proposal.
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// Freezes the proposal. Returns false if it was already archived.
    pub fn archive(&mut self) -> bool {
        if self.archived {
            return false;
        }
        self.archived = true;
        true
    }

    /// Re-derives the status through `policy`.
    ///
    /// This is the only way the status changes. Returns the previous status
    /// when it changed.
    pub fn reevaluate(
        &mut self,
        policy: &dyn StatusPolicy,
        mut inputs: StatusInputs,
    ) -> Option<ProposalStatus> {
        inputs.archived = self.archived;
        inputs.main_advanced = self.head != self.root;
        let next = policy.derive(&inputs);
        if next == self.status {
            return None;
        }
        let previous = self.status;
        self.status = next;
        Some(previous)
    }

    /// Reads a stat, defaulting to zero.
    pub fn stat(&self, key: &str) -> i64 {
        self.stats.get(key).copied().unwrap_or(0)
    }

    /// Overwrites a stat.
    pub fn set_stat(&mut self, key: &str, value: i64) {
        self.stats.insert(key.to_string(), value);
    }

    /// Adds `delta` to a stat.
    pub fn bump_stat(&mut self, key: &str, delta: i64) {
        *self.stats.entry(key.to_string()).or_insert(0) += delta;
    }

    /// Records a user's vote, replacing any previous one. Zero retracts.
    pub fn apply_vote(&mut self, user: UserId, value: i8) {
        let value = value.clamp(-1, 1);
        if value == 0 {
            self.votes.remove(&user);
        } else {
            self.votes.insert(user, value);
        }
        let score: i64 = self.votes.values().map(|v| i64::from(*v)).sum();
        self.set_stat(stats::VOTES, score);
    }

    /// Replaces the title and records the change.
    pub fn rename(&mut self, title: impl Into<String>, by: ContributorId, message: impl Into<String>) {
        let title = title.into();
        let previous = std::mem::replace(&mut self.title, title.clone());
        self.title_history.push(TitleChange {
            previous,
            title,
            changed_by: by,
            message: message.into(),
            changed_at: Timestamp::now(),
        });
    }

    /// Marks a canonical mutation: bumps the version and the update time.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Timestamp::now();
    }
}

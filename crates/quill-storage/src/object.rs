//! Commit and blob objects.

use quill_types::{ContributorId, ObjectId, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;

/// Snapshot of a proposal's text, addressed by its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Hash of the content.
    pub id: ObjectId,
    /// The text.
    pub content: String,
}

impl Blob {
    /// Creates a blob, computing its id from the content.
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let id = ObjectId::hash_object("blob", content.as_bytes());
        Self { id, content }
    }

    /// Returns the size of the content in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// An immutable node of a proposal's history.
///
/// Root commits have no parent, normal commits one and merge commits two
/// (target head first, source head second).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Hash over the canonical encoding of every other field.
    pub id: ObjectId,
    /// Proposal owning this commit.
    pub proposal_id: ProposalId,
    /// Parent commits.
    pub parents: SmallVec<[ObjectId; 2]>,
    /// Blob holding the full content at this commit.
    pub content: ObjectId,
    /// Contributor who authored the commit.
    pub author: ContributorId,
    /// Commit message.
    pub message: String,
    /// Creation time.
    pub timestamp: Timestamp,
}

impl Commit {
    /// Creates a commit, computing its id.
    pub fn new(
        proposal_id: ProposalId,
        parents: &[ObjectId],
        content: ObjectId,
        author: ContributorId,
        message: impl Into<String>,
    ) -> Self {
        Self::at(proposal_id, parents, content, author, message, Timestamp::now())
    }

    /// Creates a commit with an explicit timestamp.
    pub fn at(
        proposal_id: ProposalId,
        parents: &[ObjectId],
        content: ObjectId,
        author: ContributorId,
        message: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        let message = message.into();
        let parents: SmallVec<[ObjectId; 2]> = parents.iter().copied().collect();
        let id = ObjectId::hash_object(
            "commit",
            &Self::encode(proposal_id, &parents, &content, author, &message, timestamp),
        );
        Self {
            id,
            proposal_id,
            parents,
            content,
            author,
            message,
            timestamp,
        }
    }

    fn encode(
        proposal_id: ProposalId,
        parents: &[ObjectId],
        content: &ObjectId,
        author: ContributorId,
        message: &str,
        timestamp: Timestamp,
    ) -> Vec<u8> {
        let mut out = format!("proposal {}\ncontent {}\n", proposal_id.get(), content);
        for parent in parents {
            let _ = writeln!(out, "parent {parent}");
        }
        let _ = write!(out, "author {} {}\n\n{}", author.get(), timestamp.as_millis(), message);
        out.into_bytes()
    }

    /// Returns true if this is the proposal's root commit.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns true for two-parent merge commits.
    pub fn is_merge(&self) -> bool {
        self.parents.len() == 2
    }

    /// First parent, followed by history listings.
    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    /// Recomputes the id and compares it to the stored one.
    pub fn verify(&self) -> bool {
        let expected = ObjectId::hash_object(
            "commit",
            &Self::encode(
                self.proposal_id,
                &self.parents,
                &self.content,
                self.author,
                &self.message,
                self.timestamp,
            ),
        );
        expected == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(parents: &[ObjectId], message: &str) -> Commit {
        Commit::at(
            ProposalId::new(1),
            parents,
            Blob::new("text").id,
            ContributorId::new(1),
            message,
            Timestamp::from_millis(1_000),
        )
    }

    #[test]
    fn test_blob_hash_is_content_derived() {
        assert_eq!(Blob::new("hello").id, Blob::new("hello").id);
        assert_ne!(Blob::new("hello").id, Blob::new("hello!").id);
    }

    #[test]
    fn test_commit_hash_is_deterministic() {
        let a = commit(&[], "root");
        let b = commit(&[], "root");
        assert_eq!(a.id, b.id);
        assert!(a.verify());
    }

    #[test]
    fn test_commit_hash_covers_parents_and_message() {
        let root = commit(&[], "root");
        let child = commit(&[root.id], "root");
        let other = commit(&[root.id], "different");
        assert_ne!(root.id, child.id);
        assert_ne!(child.id, other.id);
    }

    #[test]
    fn test_commit_shape() {
        let root = commit(&[], "root");
        let a = commit(&[root.id], "a");
        let merge = commit(&[root.id, a.id], "merge");
        assert!(root.is_root());
        assert!(!a.is_merge());
        assert!(merge.is_merge());
        assert_eq!(merge.first_parent(), Some(root.id));
    }

    #[test]
    fn test_tampered_commit_fails_verification() {
        let mut c = commit(&[], "root");
        c.message.push('!');
        assert!(!c.verify());
    }
}

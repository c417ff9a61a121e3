//! Commit graph walks.

use quill_storage::{Commit, ProposalStore};
use quill_types::ObjectId;
use std::collections::{HashSet, VecDeque};

use crate::{Result, VcsError};

/// Loads a commit or fails with `NotFound`.
pub(crate) fn load_commit(store: &dyn ProposalStore, id: &ObjectId) -> Result<Commit> {
    store
        .commit(id)?
        .ok_or_else(|| VcsError::NotFound(format!("commit {}", id.short())))
}

/// Full text stored at a commit.
pub(crate) fn content_at(store: &dyn ProposalStore, id: &ObjectId) -> Result<String> {
    let commit = load_commit(store, id)?;
    store
        .blob(&commit.content)?
        .map(|blob| blob.content)
        .ok_or_else(|| VcsError::NotFound(format!("content {}", commit.content.short())))
}

/// Commits reachable from `head`, `head` included, in breadth-first order.
fn ancestors(store: &dyn ProposalStore, head: &ObjectId) -> Result<Vec<ObjectId>> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([*head]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        queue.extend(load_commit(store, &id)?.parents);
    }
    Ok(order)
}

/// Returns true if `ancestor` is reachable from `descendant`. A commit is
/// its own ancestor.
pub(crate) fn is_ancestor(
    store: &dyn ProposalStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*descendant]);
    while let Some(id) = queue.pop_front() {
        if &id == ancestor {
            return Ok(true);
        }
        if seen.insert(id) {
            queue.extend(load_commit(store, &id)?.parents);
        }
    }
    Ok(false)
}

/// Best common ancestor of `a` and `b`: one that is not an ancestor of any
/// other common ancestor. Ties go to the first reached walking back from `b`.
pub(crate) fn merge_base(
    store: &dyn ProposalStore,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Option<ObjectId>> {
    let from_a: HashSet<ObjectId> = ancestors(store, a)?.into_iter().collect();
    let common: Vec<ObjectId> = ancestors(store, b)?
        .into_iter()
        .filter(|id| from_a.contains(id))
        .collect();
    // Common ancestors are closed under ancestry, so a commit below another
    // common ancestor is always the direct parent of some common ancestor.
    let mut shadowed = HashSet::new();
    for id in &common {
        shadowed.extend(load_commit(store, id)?.parents);
    }
    Ok(common.into_iter().find(|id| !shadowed.contains(id)))
}

/// First-parent history from `head`, newest first, at most `limit` commits.
pub(crate) fn first_parent_log(
    store: &dyn ProposalStore,
    head: &ObjectId,
    limit: usize,
) -> Result<Vec<Commit>> {
    let mut log = Vec::new();
    let mut next = Some(*head);
    while let Some(id) = next {
        if log.len() >= limit {
            break;
        }
        let commit = load_commit(store, &id)?;
        next = commit.first_parent();
        log.push(commit);
    }
    Ok(log)
}

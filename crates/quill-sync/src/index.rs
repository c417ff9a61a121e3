//! The search index port and its in-process adapter.

use async_trait::async_trait;
use parking_lot::RwLock;
use quill_types::{ProposalId, ProposalStatus, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{PublishSnapshot, Result};

/// Denormalized, separately queried store of proposal snapshots.
///
/// Both operations are idempotent and keyed by proposal id.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upserts a snapshot. Snapshots older than the stored one are ignored.
    async fn publish(&self, snapshot: &PublishSnapshot) -> Result<()>;

    /// Removes a proposal's document. Removing a missing document succeeds.
    async fn delete(&self, proposal_id: ProposalId) -> Result<()>;
}

/// Result ordering of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    /// Highest vote score first.
    #[default]
    Votes,
    /// Most recently updated first.
    Recent,
}

/// A search over published snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Whitespace-separated terms; every term must appear in the title or
    /// the content (case-insensitive).
    pub text: Option<String>,
    /// Owner filter.
    pub owner: Option<UserId>,
    /// Status filter.
    pub status: Option<ProposalStatus>,
    /// Ordering.
    pub order: SearchOrder,
    /// One-based page index.
    pub page: usize,
    /// Page size.
    pub page_size: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            owner: None,
            status: None,
            order: SearchOrder::default(),
            page: 1,
            page_size: 20,
        }
    }
}

impl SearchQuery {
    fn matches(&self, snapshot: &PublishSnapshot, terms: &[String]) -> bool {
        if self.owner.as_ref().is_some_and(|o| &snapshot.owner_id != o) {
            return false;
        }
        if self.status.is_some_and(|s| snapshot.status != s) {
            return false;
        }
        if terms.is_empty() {
            return true;
        }
        let title = snapshot.title.to_lowercase();
        let content = snapshot.content.to_lowercase();
        terms
            .iter()
            .all(|t| title.contains(t.as_str()) || content.contains(t.as_str()))
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<PublishSnapshot>,
    pub page: usize,
    pub page_size: usize,
    /// Number of matches over all pages.
    pub total: usize,
}

/// In-process search index.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    documents: RwLock<HashMap<ProposalId, PublishSnapshot>>,
}

impl MemorySearchIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a document.
    pub fn get(&self, id: ProposalId) -> Option<PublishSnapshot> {
        self.documents.read().get(&id).cloned()
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Runs a query.
    pub fn search(&self, query: &SearchQuery) -> SearchPage {
        let terms: Vec<String> = query
            .text
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut hits: Vec<PublishSnapshot> = self
            .documents
            .read()
            .values()
            .filter(|s| query.matches(s, &terms))
            .cloned()
            .collect();
        match query.order {
            SearchOrder::Votes => hits.sort_by(|a, b| {
                b.votes()
                    .cmp(&a.votes())
                    .then(b.updated_at.cmp(&a.updated_at))
                    .then(a.id.cmp(&b.id))
            }),
            SearchOrder::Recent => {
                hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)))
            }
        }

        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, 100);
        let total = hits.len();
        let items = hits
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        SearchPage {
            items,
            page,
            page_size,
            total,
        }
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn publish(&self, snapshot: &PublishSnapshot) -> Result<()> {
        let mut documents = self.documents.write();
        if let Some(existing) = documents.get(&snapshot.id) {
            if existing.version > snapshot.version {
                tracing::debug!(
                    proposal_id = %snapshot.id,
                    stored = existing.version,
                    received = snapshot.version,
                    "ignoring outdated snapshot"
                );
                return Ok(());
            }
        }
        documents.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn delete(&self, proposal_id: ProposalId) -> Result<()> {
        self.documents.write().remove(&proposal_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{stats, ObjectId, Timestamp};
    use std::collections::BTreeMap;

    fn snapshot(id: u64, title: &str, votes: i64, version: u64) -> PublishSnapshot {
        PublishSnapshot {
            id: ProposalId::new(id),
            title: title.to_string(),
            content: format!("Body of {title}"),
            owner_id: UserId::new(if id % 2 == 0 { "bob" } else { "alice" }),
            owner_name: "Owner".into(),
            contributors: Vec::new(),
            version,
            status: ProposalStatus::Draft,
            stats: BTreeMap::from([(stats::VOTES.to_string(), votes)]),
            branches: Vec::new(),
            last_commit: ObjectId::from_bytes([0; 32]),
            created_at: Timestamp::from_millis(id),
            updated_at: Timestamp::from_millis(id * 10),
        }
    }

    #[tokio::test]
    async fn test_publish_twice_keeps_one_document() {
        let index = MemorySearchIndex::new();
        let s = snapshot(1, "Parks", 0, 3);
        index.publish(&s).await.unwrap();
        index.publish(&s).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_older_version_is_ignored() {
        let index = MemorySearchIndex::new();
        index.publish(&snapshot(1, "New title", 0, 5)).await.unwrap();
        index.publish(&snapshot(1, "Old title", 0, 4)).await.unwrap();
        assert_eq!(index.get(ProposalId::new(1)).unwrap().title, "New title");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = MemorySearchIndex::new();
        index.publish(&snapshot(1, "Parks", 0, 1)).await.unwrap();
        index.delete(ProposalId::new(1)).await.unwrap();
        index.delete(ProposalId::new(1)).await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_orders_and_pages() {
        let index = MemorySearchIndex::new();
        index.publish(&snapshot(1, "Parks budget", 2, 1)).await.unwrap();
        index.publish(&snapshot(2, "Parking rules", 5, 1)).await.unwrap();
        index.publish(&snapshot(3, "Library hours", 9, 1)).await.unwrap();

        let page = index.search(&SearchQuery {
            text: Some("PARK".into()),
            ..SearchQuery::default()
        });
        assert_eq!(page.total, 2);
        let ids: Vec<u64> = page.items.iter().map(|s| s.id.get()).collect();
        assert_eq!(ids, vec![2, 1]);

        let recent = index.search(&SearchQuery {
            order: SearchOrder::Recent,
            page: 2,
            page_size: 2,
            ..SearchQuery::default()
        });
        assert_eq!(recent.total, 3);
        assert_eq!(recent.items.len(), 1);
        assert_eq!(recent.items[0].id.get(), 1);

        let mine = index.search(&SearchQuery {
            owner: Some(UserId::new("alice")),
            ..SearchQuery::default()
        });
        assert_eq!(mine.total, 2);
    }
}

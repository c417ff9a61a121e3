//! Proposal listing queries.
//!
//! Semantics every backend must follow:
//!
//! - `owner` and `status` are equality filters.
//! - `title_prefix` is a case-sensitive prefix filter on the title.
//! - `updated_after` / `updated_before` form a half-open range
//!   `(after, before]` on `updated_at`.
//! - Results are ordered by the sort key, ties broken by proposal id, in the
//!   requested direction.
//! - Pagination is keyset-based: the cursor returned with a page names the
//!   last item, and the next page starts strictly after it. Cursors stay valid
//!   while data changes; items may move between pages when their sort key
//!   changes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use quill_types::{Proposal, ProposalStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StorageError};

/// Default page size.
pub const DEFAULT_LIMIT: usize = 30;

/// Maximum page size.
pub const MAX_LIMIT: usize = 100;

/// Field proposals are ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Creation time.
    CreatedAt,
    /// Last mutation time.
    #[default]
    UpdatedAt,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

/// Opaque keyset cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    fn encode(sort_value: u64, id: u64) -> Self {
        Self(URL_SAFE_NO_PAD.encode(format!("{sort_value}:{id}")))
    }

    fn decode(&self) -> Result<(u64, u64)> {
        let invalid = || StorageError::InvalidCursor(self.0.clone());
        let raw = URL_SAFE_NO_PAD.decode(&self.0).map_err(|_| invalid())?;
        let raw = String::from_utf8(raw).map_err(|_| invalid())?;
        let (value, id) = raw.split_once(':').ok_or_else(invalid)?;
        Ok((
            value.parse().map_err(|_| invalid())?,
            id.parse().map_err(|_| invalid())?,
        ))
    }

    /// Wraps a cursor string received from a client.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The cursor string handed to clients.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items of this page.
    pub items: Vec<T>,
    /// Cursor for the next page, if there is one.
    pub next_cursor: Option<Cursor>,
}

/// Filter, order and page window for listing proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalQuery {
    /// Owner equality filter.
    pub owner: Option<UserId>,
    /// Status equality filter.
    pub status: Option<ProposalStatus>,
    /// Title prefix filter.
    pub title_prefix: Option<String>,
    /// Exclusive lower bound on `updated_at`.
    pub updated_after: Option<Timestamp>,
    /// Inclusive upper bound on `updated_at`.
    pub updated_before: Option<Timestamp>,
    /// Sort key.
    pub sort: SortKey,
    /// Sort direction.
    pub order: SortOrder,
    /// Continue after this cursor.
    pub cursor: Option<Cursor>,
    /// Page size, clamped to `1..=MAX_LIMIT`.
    pub limit: usize,
}

impl Default for ProposalQuery {
    fn default() -> Self {
        Self {
            owner: None,
            status: None,
            title_prefix: None,
            updated_after: None,
            updated_before: None,
            sort: SortKey::default(),
            order: SortOrder::default(),
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ProposalQuery {
    /// Returns true if `proposal` passes every filter.
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.owner.as_ref().is_none_or(|o| &proposal.owner.id == o)
            && self.status.is_none_or(|s| proposal.status() == s)
            && self
                .title_prefix
                .as_deref()
                .is_none_or(|p| proposal.title.starts_with(p))
            && self.updated_after.is_none_or(|t| proposal.updated_at > t)
            && self.updated_before.is_none_or(|t| proposal.updated_at <= t)
    }

    fn sort_value(&self, proposal: &Proposal) -> (u64, u64) {
        let value = match self.sort {
            SortKey::CreatedAt => proposal.created_at.as_millis(),
            SortKey::UpdatedAt => proposal.updated_at.as_millis(),
        };
        (value, proposal.id.get())
    }

    /// Filters, orders and pages `proposals`.
    ///
    /// Backends without native query support call this on a scan.
    pub fn execute(&self, proposals: impl IntoIterator<Item = Proposal>) -> Result<Page<Proposal>> {
        let after = self.cursor.as_ref().map(Cursor::decode).transpose()?;
        let limit = self.limit.clamp(1, MAX_LIMIT);

        let mut matching: Vec<((u64, u64), Proposal)> = proposals
            .into_iter()
            .filter(|p| self.matches(p))
            .map(|p| (self.sort_value(&p), p))
            .collect();
        matching.sort_by(|a, b| match self.order {
            SortOrder::Asc => a.0.cmp(&b.0),
            SortOrder::Desc => b.0.cmp(&a.0),
        });

        let mut items: Vec<((u64, u64), Proposal)> = matching
            .into_iter()
            .filter(|(key, _)| match (after, self.order) {
                (None, _) => true,
                (Some(cursor), SortOrder::Asc) => *key > cursor,
                (Some(cursor), SortOrder::Desc) => *key < cursor,
            })
            .take(limit + 1)
            .collect();

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|((value, id), _)| Cursor::encode(*value, *id))
        } else {
            None
        };

        Ok(Page {
            items: items.into_iter().map(|(_, p)| p).collect(),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{ObjectId, ProposalId, UserRef};

    fn proposal(id: u64, owner: &str, title: &str, updated: u64) -> Proposal {
        let mut p = Proposal::new(
            ProposalId::new(id),
            title,
            UserRef::new(owner, owner),
            ObjectId::from_bytes([id as u8; 32]),
        );
        p.created_at = Timestamp::from_millis(id);
        p.updated_at = Timestamp::from_millis(updated);
        p
    }

    fn fixtures() -> Vec<Proposal> {
        vec![
            proposal(1, "alice", "Parks budget", 10),
            proposal(2, "bob", "Parking rules", 30),
            proposal(3, "alice", "Library hours", 20),
            proposal(4, "alice", "Parks lighting", 40),
        ]
    }

    #[test]
    fn test_equality_and_prefix_filters() {
        let query = ProposalQuery {
            owner: Some(UserId::new("alice")),
            title_prefix: Some("Parks".into()),
            ..ProposalQuery::default()
        };
        let page = query.execute(fixtures()).unwrap();
        let ids: Vec<u64> = page.items.iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![4, 1]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_range_filter_is_half_open() {
        let query = ProposalQuery {
            updated_after: Some(Timestamp::from_millis(10)),
            updated_before: Some(Timestamp::from_millis(30)),
            sort: SortKey::UpdatedAt,
            order: SortOrder::Asc,
            ..ProposalQuery::default()
        };
        let ids: Vec<u64> = query
            .execute(fixtures())
            .unwrap()
            .items
            .iter()
            .map(|p| p.id.get())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_cursor_pagination_visits_everything_once() {
        let mut query = ProposalQuery {
            sort: SortKey::CreatedAt,
            order: SortOrder::Asc,
            limit: 3,
            ..ProposalQuery::default()
        };
        let first = query.execute(fixtures()).unwrap();
        assert_eq!(first.items.len(), 3);
        let cursor = first.next_cursor.clone().expect("second page");

        query.cursor = Some(cursor);
        let second = query.execute(fixtures()).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id.get(), 4);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn test_garbage_cursor_is_rejected() {
        let query = ProposalQuery {
            cursor: Some(Cursor::from_raw("not-a-cursor")),
            ..ProposalQuery::default()
        };
        assert!(matches!(
            query.execute(fixtures()),
            Err(StorageError::InvalidCursor(_))
        ));
    }
}

//! Outbox rows: pending notifications for the search index.

use quill_types::{ProposalId, Timestamp};
use serde::{Deserialize, Serialize};

/// What the row asks the search index to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxKind {
    /// Upsert the snapshot carried in the payload.
    Publish,
    /// Remove the proposal's search document.
    Delete,
}

/// Delivery state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Permanently rejected or out of attempts; needs an operator.
    Failed,
}

/// A row to be enqueued as part of a [`crate::WriteBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEntry {
    /// Proposal the notification is about.
    pub proposal_id: ProposalId,
    /// Proposal version the payload was built from.
    pub version: u64,
    /// Requested operation.
    pub kind: OutboxKind,
    /// Opaque JSON payload.
    pub payload: serde_json::Value,
}

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Sequence number, increasing in enqueue order.
    pub id: u64,
    /// Proposal the notification is about.
    pub proposal_id: ProposalId,
    /// Proposal version the payload was built from.
    pub version: u64,
    /// Requested operation.
    pub kind: OutboxKind,
    /// Opaque JSON payload.
    pub payload: serde_json::Value,
    /// Delivery state.
    pub status: OutboxStatus,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Last delivery error.
    pub last_error: Option<String>,
    /// Enqueue time.
    pub created_at: Timestamp,
    /// Last state change.
    pub updated_at: Timestamp,
}

impl OutboxRecord {
    /// Materializes a row from a batch entry.
    pub fn from_entry(id: u64, entry: NewOutboxEntry) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            proposal_id: entry.proposal_id,
            version: entry.version,
            kind: entry.kind,
            payload: entry.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

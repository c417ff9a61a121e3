//! Operator alerts for undeliverable snapshots.

use parking_lot::Mutex;
use quill_storage::OutboxKind;
use quill_types::ProposalId;
use serde::Serialize;

/// A row that was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAlert {
    pub outbox_id: u64,
    pub proposal_id: ProposalId,
    pub version: u64,
    pub kind: OutboxKind,
    pub attempts: u32,
    pub error: String,
    /// True when the index rejected the payload, false when retries ran out.
    pub rejected: bool,
}

/// Receives alerts about failed deliveries.
pub trait AlertSink: Send + Sync {
    /// Reports a row marked failed.
    fn raise(&self, alert: SyncAlert);
}

/// Reports alerts through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: SyncAlert) {
        tracing::error!(
            outbox_id = alert.outbox_id,
            proposal_id = %alert.proposal_id,
            version = alert.version,
            kind = ?alert.kind,
            attempts = alert.attempts,
            rejected = alert.rejected,
            error = %alert.error,
            "search index delivery failed permanently"
        );
    }
}

/// Collects alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<SyncAlert>>,
}

impl MemoryAlertSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts raised so far.
    pub fn alerts(&self) -> Vec<SyncAlert> {
        self.alerts.lock().clone()
    }
}

impl AlertSink for MemoryAlertSink {
    fn raise(&self, alert: SyncAlert) {
        self.alerts.lock().push(alert);
    }
}

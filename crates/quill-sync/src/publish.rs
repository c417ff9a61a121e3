//! Delivery of staged snapshots to the search index.

use quill_storage::{OutboxKind, OutboxRecord, ProposalLocks, ProposalStore, WriteBatch};
use quill_types::ProposalId;
use std::sync::Arc;

use crate::{
    AlertSink, LogAlertSink, Outbox, PublishSnapshot, Result, RetryPolicy, SearchIndex, SyncAlert,
    SyncError,
};

/// Default number of rows fetched per drain round.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Final state of one delivery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The index acknowledged; the row is gone.
    Delivered,
    /// The row was marked failed and an alert raised.
    Failed,
}

/// Counts of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Keeps the search index eventually consistent with the canonical store.
pub struct PublishSync {
    store: Arc<dyn ProposalStore>,
    index: Arc<dyn SearchIndex>,
    outbox: Outbox,
    locks: Arc<ProposalLocks>,
    retry: RetryPolicy,
    alerts: Arc<dyn AlertSink>,
    batch_size: usize,
}

impl PublishSync {
    /// Creates a synchronizer with the default retry policy, logging alerts.
    pub fn new(
        store: Arc<dyn ProposalStore>,
        index: Arc<dyn SearchIndex>,
        outbox: Outbox,
        locks: Arc<ProposalLocks>,
    ) -> Self {
        Self {
            store,
            index,
            outbox,
            locks,
            retry: RetryPolicy::default(),
            alerts: Arc::new(LogAlertSink),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the alert sink.
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Sets how many rows a drain round fetches.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The staging half shared with the mutating components.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Enqueues a fresh snapshot of the current state of a proposal.
    ///
    /// The proposal itself is not modified. Returns the outbox row id.
    pub fn on_proposal_changed(&self, proposal_id: ProposalId) -> Result<u64> {
        let id = self.locks.with(proposal_id, || -> Result<u64> {
            let proposal = self
                .store
                .proposal(proposal_id)?
                .ok_or_else(|| SyncError::NotFound(proposal_id.to_string()))?;
            let mut batch = WriteBatch::new();
            self.outbox.restage(self.store.as_ref(), &mut batch, &proposal)?;
            let applied = self.store.apply(batch)?;
            applied
                .outbox_ids
                .first()
                .copied()
                .ok_or_else(|| SyncError::NotFound(format!("outbox row of {proposal_id}")))
        })?;
        tracing::info!(proposal_id = %proposal_id, outbox_id = id, "resync staged");
        self.outbox.notify();
        Ok(id)
    }

    /// Delivers one row, retrying transient failures with backoff.
    ///
    /// Every failed attempt is recorded on the row. A rejection or running out
    /// of attempts marks the row failed and raises an alert; only storage
    /// errors are returned as `Err`.
    pub async fn deliver(&self, record: &OutboxRecord) -> Result<Delivery> {
        let mut attempt = record.attempts;
        loop {
            attempt += 1;
            let error = match self.send(record).await {
                Ok(()) => {
                    self.store.ack_outbox(record.id)?;
                    tracing::debug!(
                        outbox_id = record.id,
                        proposal_id = %record.proposal_id,
                        version = record.version,
                        attempt,
                        "snapshot delivered"
                    );
                    return Ok(Delivery::Delivered);
                }
                Err(e) => e,
            };

            let give_up = !error.is_retryable() || !self.retry.allows_retry(attempt);
            self.store
                .record_outbox_failure(record.id, &error.to_string(), give_up)?;

            if give_up {
                self.alerts.raise(SyncAlert {
                    outbox_id: record.id,
                    proposal_id: record.proposal_id,
                    version: record.version,
                    kind: record.kind,
                    attempts: attempt,
                    error: error.to_string(),
                    rejected: !error.is_retryable(),
                });
                return Ok(Delivery::Failed);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            tracing::debug!(
                outbox_id = record.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send(&self, record: &OutboxRecord) -> Result<()> {
        match record.kind {
            OutboxKind::Publish => {
                let snapshot: PublishSnapshot = serde_json::from_value(record.payload.clone())
                    .map_err(|e| SyncError::Schema(format!("unreadable snapshot: {e}")))?;
                self.index.publish(&snapshot).await
            }
            OutboxKind::Delete => self.index.delete(record.proposal_id).await,
        }
    }

    /// Delivers pending rows in id order until none is left.
    pub async fn drain_pending(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        loop {
            let rows = self.store.pending_outbox(self.batch_size)?;
            if rows.is_empty() {
                return Ok(report);
            }
            for row in rows {
                match self.deliver(&row).await? {
                    Delivery::Delivered => report.delivered += 1,
                    Delivery::Failed => report.failed += 1,
                }
            }
        }
    }

    /// Rows given up on.
    pub fn failed(&self) -> Result<Vec<OutboxRecord>> {
        Ok(self.store.failed_outbox()?)
    }

    /// Moves every failed row back to pending. Returns how many moved.
    pub fn requeue_failed(&self) -> Result<usize> {
        let failed = self.store.failed_outbox()?;
        for row in &failed {
            self.store.requeue_outbox(row.id)?;
        }
        if !failed.is_empty() {
            tracing::info!(count = failed.len(), "requeued failed outbox rows");
            self.outbox.notify();
        }
        Ok(failed.len())
    }
}

impl std::fmt::Debug for PublishSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSync")
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

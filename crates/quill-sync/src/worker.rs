//! Background delivery task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::PublishSync;

/// Default interval between scans when nothing wakes the worker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drains the outbox whenever a mutation commits or the poll interval passes.
pub struct SyncWorker {
    sync: Arc<PublishSync>,
    poll_interval: Duration,
}

impl SyncWorker {
    /// Creates a worker.
    pub fn new(sync: Arc<PublishSync>, poll_interval: Duration) -> Self {
        Self {
            sync,
            poll_interval,
        }
    }

    /// Runs the worker on the current runtime.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    /// Run the worker loop until the shutdown signal is received.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(poll_ms = self.poll_interval.as_millis() as u64, "sync worker started");
        let wake = self.sync.outbox().notifier();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.sync.drain_pending().await {
                Ok(report) if report.delivered + report.failed > 0 => {
                    tracing::debug!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "outbox drained"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to drain outbox"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = wake.notified() => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        tracing::info!("sync worker stopped");
    }
}

//! Component wiring and server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use quill_collaboration::PullRequestManager;
use quill_registry::ContributorRegistry;
use quill_storage::{MemoryStore, ProposalLocks, ProposalStore};
use quill_sync::{
    HttpSearchIndex, LogAlertSink, MemorySearchIndex, Outbox, PublishSync, SearchIndex, SyncError,
    SyncWorker,
};
use quill_types::DefaultStatusPolicy;
use quill_vcs::VersionControlEngine;
use tokio::sync::watch;

use crate::api::{create_router, AppState};
use crate::config::Config;

/// A fully wired Quill node.
pub struct Node {
    state: AppState,
    worker: SyncWorker,
    listen_addr: SocketAddr,
}

impl Node {
    /// Builds every component from `config`.
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let store: Arc<dyn ProposalStore> = Arc::new(MemoryStore::new());
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
            config.merge,
        ));
        let pull_requests = Arc::new(PullRequestManager::new(
            store.clone(),
            locks.clone(),
            outbox.clone(),
            registry.clone(),
            engine.clone(),
        ));

        let (index, search): (Arc<dyn SearchIndex>, Option<Arc<MemorySearchIndex>>) =
            match &config.sync.index_url {
                Some(url) => {
                    tracing::info!(url = %url, "publishing to external search index");
                    let index: Arc<dyn SearchIndex> = Arc::new(HttpSearchIndex::new(
                        url.as_str(),
                        config.sync.request_timeout(),
                    )?);
                    (index, None)
                }
                None => {
                    tracing::info!("publishing to in-process search index");
                    let memory = Arc::new(MemorySearchIndex::new());
                    let index: Arc<dyn SearchIndex> = memory.clone();
                    (index, Some(memory))
                }
            };

        let sync = Arc::new(
            PublishSync::new(store, index, outbox, locks)
                .with_retry(config.sync.retry.policy())
                .with_alerts(Arc::new(LogAlertSink))
                .with_batch_size(config.sync.batch_size),
        );
        let worker = SyncWorker::new(sync.clone(), config.sync.poll_interval());

        Ok(Self {
            state: AppState {
                registry,
                engine,
                pull_requests,
                sync,
                search,
            },
            worker,
            listen_addr: config.server.listen_addr,
        })
    }

    /// Handler state, for embedding the router elsewhere.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves the API until `shutdown` resolves, then stops the sync worker.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = self.worker.spawn(shutdown_rx);

        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "HTTP API listening");

        let served = axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await;

        tracing::info!("stopping sync worker");
        let _ = shutdown_tx.send(true);
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "sync worker ended abnormally");
        }
        served
    }
}

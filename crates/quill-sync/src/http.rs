//! HTTP adapter for a remote search index.
//!
//! Documents live at `{base_url}/documents/{id}`: `PUT` upserts a snapshot,
//! `DELETE` removes it.

use async_trait::async_trait;
use quill_types::ProposalId;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::{PublishSnapshot, Result, SearchIndex, SyncError};

/// Search index reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSearchIndex {
    client: Client,
    base_url: String,
}

impl HttpSearchIndex {
    /// Creates a client for the index at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("quill-sync")
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Delivery(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn document_url(&self, id: ProposalId) -> String {
        format!("{}/documents/{}", self.base_url, id.get())
    }

    /// Maps a response status onto the retry taxonomy.
    async fn check(response: Response, missing_ok: bool) -> Result<()> {
        let status = response.status();
        if status.is_success() || (missing_ok && status == StatusCode::NOT_FOUND) {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("index returned {status}: {body}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(SyncError::Delivery(message))
        } else {
            Err(SyncError::Schema(message))
        }
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn publish(&self, snapshot: &PublishSnapshot) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(snapshot.id))
            .json(snapshot)
            .send()
            .await
            .map_err(|e| SyncError::Delivery(e.to_string()))?;
        Self::check(response, false).await
    }

    async fn delete(&self, proposal_id: ProposalId) -> Result<()> {
        let response = self
            .client
            .delete(self.document_url(proposal_id))
            .send()
            .await
            .map_err(|e| SyncError::Delivery(e.to_string()))?;
        Self::check(response, true).await
    }
}

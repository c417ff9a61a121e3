//! Search and sync administration endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/search` | Query the in-process index |
//! | GET | `/api/sync/failed` | Outbox rows given up on |
//! | POST | `/api/sync/requeue` | Retry every failed row |
//!
//! `/api/search` answers `501` when an external index is configured; that
//! service is queried directly.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use quill_sync::SearchQuery;

use crate::api::{ApiError, ApiResult, AppState};

/// Creates the search and sync routes.
pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/sync/failed", get(failed_rows))
        .route("/api/sync/requeue", post(requeue_failed))
}

/// Searches published proposals.
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let index = state.search.as_ref().ok_or_else(|| {
        ApiError::NotImplemented("search is served by the external index".into())
    })?;
    Ok(Json(index.search(&query)))
}

/// Lists failed outbox rows.
async fn failed_rows(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.sync.failed()?))
}

/// Moves failed outbox rows back to pending.
async fn requeue_failed(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let requeued = state.sync.requeue_failed()?;
    Ok(Json(serde_json::json!({ "requeued": requeued })))
}

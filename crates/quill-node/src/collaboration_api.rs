//! # Pull Request API
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/proposals/{id}/pulls?status=` | List pull requests |
//! | POST | `/api/proposals/{id}/pulls` | Open a pull request |
//! | GET | `/api/pulls/{pr}` | Get a pull request |
//! | POST | `/api/pulls/{pr}/merge` | Merge into `main` |
//! | POST | `/api/pulls/{pr}/close` | Close without merging |
//! | GET | `/api/pulls/{pr}/diff` | Changes under review |
//!
//! ## State Transitions
//!
//! ```text
//! Open ──┬──> Merged (terminal)
//!        ├──> Closed (terminal)
//!        └──> Stale ──> Closed
//! ```
//!
//! A merge fails with `409 stale_pull_request` once `main` moved past the
//! pull request's base, and with `409 merge_conflict` (listing the
//! conflicting regions) when the edits overlap.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use quill_types::{ContributorId, ProposalId, PullRequestId, PullRequestStatus};
use serde::Deserialize;
use validator::Validate;

use crate::api::{ApiError, ApiResult, AppState};

/// Creates the pull request routes.
pub fn collaboration_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/proposals/{id}/pulls",
            get(list_pulls).post(open_pull),
        )
        .route("/api/pulls/{pr}", get(get_pull))
        .route("/api/pulls/{pr}/merge", post(merge_pull))
        .route("/api/pulls/{pr}/close", post(close_pull))
        .route("/api/pulls/{pr}/diff", get(pull_diff))
}

/// Query parameters for listing pull requests.
#[derive(Debug, Deserialize)]
pub struct ListPullsQuery {
    pub status: Option<String>,
}

/// Request to open a pull request.
#[derive(Debug, Deserialize, Validate)]
pub struct OpenPullRequest {
    pub contributor_id: ContributorId,
    #[validate(length(max = 10_000))]
    #[serde(default)]
    pub description: String,
}

/// Request to merge a pull request.
#[derive(Debug, Deserialize, Validate)]
pub struct MergePullRequest {
    pub merger: ContributorId,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// Request to close a pull request.
#[derive(Debug, Deserialize)]
pub struct ClosePullRequest {
    pub actor: ContributorId,
}

/// Lists pull requests of a proposal.
async fn list_pulls(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<ListPullsQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(
            PullRequestStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{raw}'")))?,
        ),
    };
    Ok(Json(state.pull_requests.list(ProposalId::new(id), status)?))
}

/// Opens a pull request.
async fn open_pull(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<OpenPullRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let pr = state
        .pull_requests
        .open(ProposalId::new(id), req.contributor_id, &req.description)?;
    Ok((StatusCode::CREATED, Json(pr)))
}

/// Gets a pull request.
async fn get_pull(
    State(state): State<AppState>,
    Path(pr): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.pull_requests.get(PullRequestId::new(pr))?))
}

/// Merges a pull request.
async fn merge_pull(
    State(state): State<AppState>,
    Path(pr): Path<u64>,
    Json(req): Json<MergePullRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let merged = state
        .pull_requests
        .merge(PullRequestId::new(pr), req.merger, &req.message)?;
    Ok(Json(merged))
}

/// Closes a pull request.
async fn close_pull(
    State(state): State<AppState>,
    Path(pr): Path<u64>,
    Json(req): Json<ClosePullRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.pull_requests.close(PullRequestId::new(pr), req.actor)?,
    ))
}

/// Diff under review.
async fn pull_diff(
    State(state): State<AppState>,
    Path(pr): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.pull_requests.review_diff(PullRequestId::new(pr))?))
}

//! HTTP API for the Quill node.
//!
//! ## Proposal Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/proposals` | List proposals |
//! | POST | `/api/proposals` | Create a proposal |
//! | GET | `/api/proposals/{id}` | Get a proposal |
//! | PATCH | `/api/proposals/{id}/title` | Rename |
//! | POST | `/api/proposals/{id}/archive` | Archive |
//! | POST | `/api/proposals/{id}/votes` | Vote (+1, -1, 0 retracts) |
//! | POST | `/api/proposals/{id}/resync` | Re-publish the current snapshot |
//! | GET | `/api/proposals/{id}/branches` | List branches |
//! | GET | `/api/proposals/{id}/history?branch=` | First-parent log |
//! | GET | `/api/proposals/{id}/content?branch=` | Text at a branch head |
//! | POST | `/api/proposals/{id}/commits` | Commit an edit |
//! | POST | `/api/proposals/{id}/merge` | Merge two branches directly |
//! | GET | `/api/proposals/{id}/diff?from=&to=` | Diff two commits |
//! | GET | `/api/proposals/{id}/contributors` | List contributors |
//! | POST | `/api/proposals/{id}/contributors` | Add or invite a contributor |
//! | POST | `/api/proposals/{id}/contributors/{cid}/accept` | Accept an invitation |
//! | DELETE | `/api/proposals/{id}/contributors/{cid}` | Remove a contributor |
//!
//! Pull request, search and sync routes live in
//! [`crate::collaboration_api`] and [`crate::search_api`].
//!
//! Errors are returned as `{ "error": "...", "kind": "..." }`, plus the
//! conflicting regions for merge conflicts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use quill_collaboration::{CollaborationError, PullRequestManager};
use quill_registry::{ContributorRegistry, RegistryError};
use quill_storage::{Cursor, ProposalQuery, SortKey, SortOrder, DEFAULT_LIMIT};
use quill_sync::{MemorySearchIndex, PublishSync, SyncError};
use quill_types::{
    BranchName, ContributorId, ContributorRole, ErrorKind, ObjectId, ProposalId, ProposalStatus,
    Timestamp, UserId, UserRef,
};
use quill_vcs::{CancellationToken, ConflictRegion, VcsError, VersionControlEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::collaboration_api::collaboration_routes;
use crate::search_api::search_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Contributor membership and roles.
    pub registry: Arc<ContributorRegistry>,
    /// Commits, merges and proposal metadata.
    pub engine: Arc<VersionControlEngine>,
    /// Pull request lifecycle.
    pub pull_requests: Arc<PullRequestManager>,
    /// Outbox delivery.
    pub sync: Arc<PublishSync>,
    /// In-process search index, when no external index is configured.
    pub search: Option<Arc<MemorySearchIndex>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Collaboration(#[from] CollaborationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    NotImplemented(String),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Vcs(e) => e.kind(),
            Self::Collaboration(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Sync(e) => e.kind(),
            Self::BadRequest(_) | Self::NotImplemented(_) => ErrorKind::Validation,
        }
    }

    fn conflicts(&self) -> Option<&[ConflictRegion]> {
        match self {
            Self::Vcs(VcsError::MergeConflict { regions }) => Some(regions),
            Self::Collaboration(e) => e.conflicts(),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        if matches!(self, Self::NotImplemented(_)) {
            return StatusCode::NOT_IMPLEMENTED;
        }
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::DuplicateContributor
            | ErrorKind::StalePullRequest
            | ErrorKind::MergeConflict
            | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::SyncDelivery | ErrorKind::SyncSchema => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %self.kind(), "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
            conflicts: self.conflicts().map(<[ConflictRegion]>::to_vec),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<Vec<ConflictRegion>>,
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

fn check<T: Validate>(request: &T) -> ApiResult<()> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_branch(raw: Option<&str>) -> ApiResult<BranchName> {
    match raw {
        None => Ok(BranchName::Main),
        Some(raw) => raw
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("{e}"))),
    }
}

fn parse_commit(raw: &str) -> ApiResult<ObjectId> {
    ObjectId::from_hex(raw).map_err(|e| ApiError::BadRequest(format!("{e}")))
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/proposals", get(list_proposals).post(create_proposal))
        .route("/api/proposals/{id}", get(get_proposal))
        .route("/api/proposals/{id}/title", patch(update_title))
        .route("/api/proposals/{id}/archive", post(archive_proposal))
        .route("/api/proposals/{id}/votes", post(record_vote))
        .route("/api/proposals/{id}/resync", post(resync_proposal))
        .route("/api/proposals/{id}/branches", get(list_branches))
        .route("/api/proposals/{id}/history", get(history))
        .route("/api/proposals/{id}/content", get(content))
        .route("/api/proposals/{id}/commits", post(create_commit))
        .route("/api/proposals/{id}/merge", post(merge_branches))
        .route("/api/proposals/{id}/diff", get(diff_commits))
        .route(
            "/api/proposals/{id}/contributors",
            get(list_contributors).post(add_contributor),
        )
        .route(
            "/api/proposals/{id}/contributors/{cid}/accept",
            post(accept_invitation),
        )
        .route(
            "/api/proposals/{id}/contributors/{cid}",
            delete(remove_contributor),
        )
        .merge(collaboration_routes())
        .merge(search_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ==================== Request Types ====================

/// Request to create a proposal.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProposalRequest {
    #[validate(length(min = 1, max = 128))]
    pub owner_id: String,
    #[validate(length(min = 1, max = 128))]
    pub owner_name: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// Query parameters for listing proposals.
#[derive(Debug, Default, Deserialize)]
pub struct ListProposalsParams {
    pub owner: Option<String>,
    pub status: Option<String>,
    pub title_prefix: Option<String>,
    /// Milliseconds since the epoch, exclusive.
    pub updated_after: Option<u64>,
    /// Milliseconds since the epoch, inclusive.
    pub updated_before: Option<u64>,
    pub sort: Option<SortKey>,
    pub order: Option<SortOrder>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl ListProposalsParams {
    fn into_query(self) -> ApiResult<ProposalQuery> {
        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => Some(
                ProposalStatus::parse(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{raw}'")))?,
            ),
        };
        Ok(ProposalQuery {
            owner: self.owner.map(UserId::new),
            status,
            title_prefix: self.title_prefix,
            updated_after: self.updated_after.map(Timestamp::from_millis),
            updated_before: self.updated_before.map(Timestamp::from_millis),
            sort: self.sort.unwrap_or_default(),
            order: self.order.unwrap_or_default(),
            cursor: self.cursor.map(Cursor::from_raw),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

/// Request to rename a proposal.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTitleRequest {
    pub contributor_id: ContributorId,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// Request naming the acting contributor.
#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub contributor_id: ContributorId,
}

/// Request to vote on a proposal.
#[derive(Debug, Deserialize, Validate)]
pub struct VoteRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(range(min = -1, max = 1))]
    pub value: i8,
}

/// Query selecting a branch; `main` when absent.
#[derive(Debug, Default, Deserialize)]
pub struct BranchParams {
    pub branch: Option<String>,
    pub limit: Option<usize>,
}

/// Request to commit an edit.
#[derive(Debug, Deserialize, Validate)]
pub struct CommitRequest {
    pub branch: BranchName,
    pub contributor_id: ContributorId,
    #[validate(length(min = 1))]
    pub content: String,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// Request to merge two branches.
#[derive(Debug, Deserialize, Validate)]
pub struct MergeRequest {
    pub source: BranchName,
    #[serde(default = "main_branch")]
    pub target: BranchName,
    /// Common ancestor; the nearest one when omitted.
    #[serde(default)]
    pub base: Option<ObjectId>,
    pub merger: ContributorId,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

fn main_branch() -> BranchName {
    BranchName::Main
}

/// Query naming two commits to compare.
#[derive(Debug, Deserialize)]
pub struct DiffParams {
    pub from: String,
    pub to: String,
}

/// Request to add or invite a contributor.
#[derive(Debug, Deserialize, Validate)]
pub struct AddContributorRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub role: ContributorRole,
    /// Create a PENDING invitation instead of an ACTIVE membership.
    #[serde(default)]
    pub invite: bool,
}

/// Request to accept an invitation.
#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub user_id: String,
}

/// Text at a branch head.
#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub branch: BranchName,
    pub head: ObjectId,
    pub content: String,
}

// ==================== Proposal Handlers ====================

/// Creates a proposal.
async fn create_proposal(
    State(state): State<AppState>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let proposal = state.engine.create_proposal(
        UserRef::new(req.owner_id, req.owner_name),
        &req.title,
        &req.content,
        &req.message,
    )?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// Lists proposals.
async fn list_proposals(
    State(state): State<AppState>,
    Query(params): Query<ListProposalsParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state.engine.list_proposals(&params.into_query()?)?;
    Ok(Json(page))
}

/// Gets a proposal.
async fn get_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.get_proposal(ProposalId::new(id))?))
}

/// Renames a proposal.
async fn update_title(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateTitleRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let proposal =
        state
            .engine
            .update_title(ProposalId::new(id), req.contributor_id, &req.title, &req.message)?;
    Ok(Json(proposal))
}

/// Archives a proposal.
async fn archive_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.engine.archive(ProposalId::new(id), req.contributor_id)?,
    ))
}

/// Records a vote.
async fn record_vote(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let proposal = state
        .engine
        .record_vote(ProposalId::new(id), UserId::new(req.user_id), req.value)?;
    Ok(Json(proposal))
}

/// Re-stages the current snapshot for delivery.
async fn resync_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let outbox_id = state.sync.on_proposal_changed(ProposalId::new(id))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "outbox_id": outbox_id })),
    ))
}

/// Lists branches.
async fn list_branches(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.branches(ProposalId::new(id))?))
}

/// First-parent history of a branch.
async fn history(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<BranchParams>,
) -> ApiResult<impl IntoResponse> {
    let branch = parse_branch(params.branch.as_deref())?;
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(
        state.engine.history(ProposalId::new(id), &branch, limit)?,
    ))
}

/// Text at a branch head.
async fn content(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<BranchParams>,
) -> ApiResult<impl IntoResponse> {
    let branch = parse_branch(params.branch.as_deref())?;
    let head = state.engine.branch_head(ProposalId::new(id), &branch)?;
    let content = state.engine.content_at(&head)?;
    Ok(Json(ContentResponse {
        branch,
        head,
        content,
    }))
}

/// Commits an edit.
async fn create_commit(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<CommitRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let commit = state.engine.create_commit(
        ProposalId::new(id),
        req.branch,
        req.contributor_id,
        &req.content,
        &req.message,
    )?;
    Ok((StatusCode::CREATED, Json(commit)))
}

/// Merges two branches without a pull request.
async fn merge_branches(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let proposal_id = ProposalId::new(id);
    let base = match req.base {
        Some(base) => base,
        None => state
            .engine
            .branch_merge_base(proposal_id, &req.source, &req.target)?,
    };
    let result = state.engine.merge(
        proposal_id,
        req.source,
        req.target,
        base,
        req.merger,
        &req.message,
        &CancellationToken::new(),
    )?;
    Ok(Json(result))
}

/// Diff between two commits of a proposal.
async fn diff_commits(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<DiffParams>,
) -> ApiResult<impl IntoResponse> {
    let proposal_id = ProposalId::new(id);
    let from = parse_commit(&params.from)?;
    let to = parse_commit(&params.to)?;
    for commit in [&from, &to] {
        if state.engine.commit(commit)?.proposal_id != proposal_id {
            return Err(VcsError::NotFound(format!("commit {} in {proposal_id}", commit.short())).into());
        }
    }
    Ok(Json(state.engine.diff(&from, &to)?))
}

// ==================== Contributor Handlers ====================

/// Lists contributors.
async fn list_contributors(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.list(ProposalId::new(id))?))
}

/// Adds or invites a contributor.
async fn add_contributor(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<AddContributorRequest>,
) -> ApiResult<impl IntoResponse> {
    check(&req)?;
    let user = UserRef::new(req.user_id, req.name);
    let contributor = if req.invite {
        state
            .registry
            .invite_contributor(ProposalId::new(id), user, req.role)?
    } else {
        state
            .registry
            .add_contributor(ProposalId::new(id), user, req.role)?
    };
    Ok((StatusCode::CREATED, Json(contributor)))
}

/// Accepts an invitation.
async fn accept_invitation(
    State(state): State<AppState>,
    Path((id, cid)): Path<(u64, u64)>,
    Json(req): Json<AcceptInvitationRequest>,
) -> ApiResult<impl IntoResponse> {
    let contributor = state.registry.accept_invitation(
        ProposalId::new(id),
        ContributorId::new(cid),
        &UserId::new(req.user_id),
    )?;
    Ok(Json(contributor))
}

/// Removes a contributor.
async fn remove_contributor(
    State(state): State<AppState>,
    Path((id, cid)): Path<(u64, u64)>,
) -> ApiResult<impl IntoResponse> {
    let contributor = state
        .registry
        .remove_contributor(ProposalId::new(id), ContributorId::new(cid))?;
    Ok(Json(contributor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let err = ApiError::from(VcsError::NotFound("proposal P1".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(CollaborationError::StalePullRequest {
            pull_request: "PR1".into(),
            base: "a".into(),
            head: "b".into(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(RegistryError::Unauthorized("editor".into()));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = ApiError::from(SyncError::Delivery("timeout".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        assert_eq!(
            ApiError::NotImplemented("x".into()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_list_params_into_query() {
        let params = ListProposalsParams {
            owner: Some("alice".into()),
            status: Some("in_review".into()),
            limit: Some(5),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.owner, Some(UserId::from("alice")));
        assert_eq!(query.status, Some(ProposalStatus::InReview));
        assert_eq!(query.limit, 5);

        let params = ListProposalsParams {
            status: Some("bogus".into()),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));
    }
}

//! Issue, vote and comment endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::{CurrentUser, MaybeUser};
use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::analytics::IssueStats;
use crate::error::{AuthorizationError, CivicError, ValidationError};
use crate::identity::require_admin;
use crate::models::{Category, Issue, IssueStatus, Priority, VoteKind};
use crate::services::{CommentView, ImageUpload, IssueCard, IssueDetail, ReportIssue};
use crate::store::{IssueFilter, IssueSort};
use crate::votes::VoteSummary;
use crate::workflow::TransitionOutcome;

// ── Request types ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListIssuesQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub with_location: Option<bool>,
    pub include_resolved: Option<bool>,
    pub limit: Option<usize>,
    /// Only the caller's own reports
    pub mine: Option<bool>,
}

fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, ValidationError>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty() && *s != "all") {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

impl ListIssuesQuery {
    fn into_filter(self, viewer: &MaybeUser) -> Result<(IssueFilter, IssueSort), CivicError> {
        let reporter = if self.mine.unwrap_or(false) {
            Some(viewer.id().ok_or(AuthorizationError::Unauthenticated)?)
        } else {
            None
        };
        let filter = IssueFilter {
            search: self.search,
            status: parse_opt::<IssueStatus>(self.status.as_deref())?,
            priority: parse_opt::<Priority>(self.priority.as_deref())?,
            category: parse_opt::<Category>(self.category.as_deref())?,
            reporter,
            with_location: self.with_location.unwrap_or(false),
            include_resolved: self.include_resolved.unwrap_or(true),
            limit: self.limit,
        };
        let sort = parse_opt::<IssueSort>(self.sort.as_deref())?.unwrap_or_default();
        Ok((filter, sort))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Option<String>,
    pub location_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Base64 file content, optionally as a `data:` URL
    pub image_base64: Option<String>,
    pub image_filename: Option<String>,
}

fn decode_image(data: &str, filename: Option<String>) -> Result<ImageUpload, ValidationError> {
    let payload = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ValidationError::InvalidImage(e.to_string()))?;
    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .ok_or(ValidationError::EmptyField {
            field: "image_filename",
        })?;
    Ok(ImageUpload { bytes, filename })
}

impl CreateIssueRequest {
    fn into_report(self) -> Result<ReportIssue, ValidationError> {
        let image = match self.image_base64.as_deref().filter(|d| !d.is_empty()) {
            Some(data) => Some(decode_image(data, self.image_filename)?),
            None => None,
        };
        Ok(ReportIssue {
            title: self.title,
            description: self.description,
            category: self.category.parse()?,
            priority: parse_opt::<Priority>(self.priority.as_deref())?.unwrap_or_default(),
            location_address: self.location_address,
            latitude: self.latitude,
            longitude: self.longitude,
            image,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(alias = "body")]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: String,
}

// ── Router ───────────────────────────────────────────────────

pub fn issue_router() -> Router<AppState> {
    Router::new()
        .route("/api/issues", get(list_issues).post(create_issue))
        .route("/api/issues/:id", get(get_issue))
        .route("/api/issues/:id/votes", post(cast_vote))
        .route("/api/issues/:id/comments", get(list_comments).post(add_comment))
        .route("/api/issues/:id/status", put(update_status))
        .route("/api/issues/:id/priority", put(update_priority))
        .route("/api/issues/:id/transitions", get(allowed_transitions))
        .route("/api/stats", get(community_stats))
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/issues
async fn list_issues(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<ListIssuesQuery>,
) -> ApiResult<Json<Vec<IssueCard>>> {
    let (filter, sort) = query.into_filter(&viewer)?;
    let cards = state.service.issue_feed(viewer.id(), &filter, sort).await?;
    Ok(Json(cards))
}

/// POST /api/issues
async fn create_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateIssueRequest>,
) -> ApiResult<(StatusCode, Json<Issue>)> {
    let report = req.into_report().map_err(CivicError::from)?;
    let issue = state.service.report_issue(&user, report).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// GET /api/issues/:id
async fn get_issue(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IssueDetail>> {
    Ok(Json(state.service.issue_detail(viewer.id(), id).await?))
}

/// POST /api/issues/:id/votes
async fn cast_vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteSummary>> {
    let kind: VoteKind = req.vote_type.parse().map_err(CivicError::from)?;
    Ok(Json(state.service.cast_vote(&user, id, kind).await?))
}

/// GET /api/issues/:id/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.service.comments(id).await?))
}

/// POST /api/issues/:id/comments
async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let comment = state.service.add_comment(&user, id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /api/issues/:id/status
async fn update_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<TransitionOutcome>> {
    require_admin(&user, "change issue status").map_err(CivicError::from)?;
    let status: IssueStatus = req.status.parse().map_err(CivicError::from)?;
    Ok(Json(state.service.transition_status(&user, id, status).await?))
}

/// PUT /api/issues/:id/priority
async fn update_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<PriorityRequest>,
) -> ApiResult<Json<Issue>> {
    require_admin(&user, "change issue priority").map_err(CivicError::from)?;
    let priority: Priority = req.priority.parse().map_err(CivicError::from)?;
    Ok(Json(state.service.set_priority(&user, id, priority).await?))
}

/// GET /api/issues/:id/transitions
async fn allowed_transitions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<IssueStatus>>> {
    Ok(Json(state.service.allowed_transitions(&user, id).await?))
}

/// GET /api/stats
async fn community_stats(State(state): State<AppState>) -> Result<Json<IssueStats>, ApiError> {
    Ok(Json(state.service.community_stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opt_treats_all_as_unset() {
        assert_eq!(parse_opt::<IssueStatus>(Some("all")).unwrap(), None);
        assert_eq!(parse_opt::<IssueStatus>(Some("")).unwrap(), None);
        assert_eq!(
            parse_opt::<IssueStatus>(Some("resolved")).unwrap(),
            Some(IssueStatus::Resolved)
        );
        assert!(parse_opt::<Priority>(Some("critical")).is_err());
    }

    #[test]
    fn test_decode_data_url_image() {
        let upload = decode_image(
            "data:image/png;base64,aGVsbG8=",
            Some("photo.png".to_string()),
        )
        .unwrap();
        assert_eq!(upload.bytes, b"hello");
        assert_eq!(upload.filename, "photo.png");

        assert!(decode_image("aGVsbG8=", None).is_err());
        assert!(decode_image("***", Some("x.png".to_string())).is_err());
    }

    #[test]
    fn test_mine_requires_user() {
        let query = ListIssuesQuery {
            mine: Some(true),
            ..ListIssuesQuery::default()
        };
        assert!(query.into_filter(&MaybeUser(None)).is_err());
    }
}

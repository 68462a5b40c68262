//! Administrator dashboard and user management endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use super::state::AppState;
use crate::analytics::{AdminStats, Analytics};
use crate::error::CivicError;
use crate::models::{Profile, ProfileFilter, Role};

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub search: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/analytics", get(analytics))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", put(update_role))
}

/// GET /api/admin/stats
async fn admin_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<AdminStats>> {
    Ok(Json(state.service.admin_stats(&user, Utc::now()).await?))
}

/// GET /api/admin/analytics
async fn analytics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Analytics>> {
    Ok(Json(state.service.analytics(&user).await?))
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UsersQuery>,
) -> ApiResult<Json<Vec<Profile>>> {
    let role = match query.role.as_deref().map(str::trim) {
        Some("") | Some("all") | None => None,
        Some(r) => Some(r.parse::<Role>().map_err(CivicError::from)?),
    };
    let filter = ProfileFilter {
        search: query.search,
        role,
    };
    Ok(Json(state.service.list_users(&user, &filter).await?))
}

/// PUT /api/admin/users/:id/role
async fn update_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<Profile>> {
    let role: Role = req.role.parse().map_err(CivicError::from)?;
    Ok(Json(state.service.change_role(&user, user_id, role).await?))
}

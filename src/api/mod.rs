//! REST API
//!
//! JSON endpoints over [`IssueService`](crate::services::IssueService) plus
//! the SSE notification stream. Principals arrive in the `x-user-id` header.

pub mod admin_routes;
pub mod auth;
pub mod error;
pub mod issue_routes;
pub mod notification_routes;
pub mod state;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

pub use auth::{CurrentUser, MaybeUser, USER_ID_HEADER};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::AppState;

/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create the full API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(issue_routes::issue_router())
        .merge(admin_routes::admin_router())
        .merge(notification_routes::notification_router())
        .with_state(state)
}

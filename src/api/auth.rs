//! Principal extraction
//!
//! Authentication is delegated to the upstream auth provider, which forwards
//! the authenticated user id in the `x-user-id` header.

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::error::{AuthorizationError, CivicError};
use crate::models::Profile;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Principal id from the request headers, `None` when absent.
pub fn principal_id(headers: &HeaderMap) -> Result<Option<Uuid>, CivicError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| AuthorizationError::Unauthenticated.into())
}

/// Authenticated caller. Rejects with 403 when missing or unknown.
pub struct CurrentUser(pub Profile);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = principal_id(&parts.headers)?
            .ok_or_else(|| CivicError::from(AuthorizationError::Unauthenticated))?;
        let profile = state.service.principal(user_id).await?;
        Ok(CurrentUser(profile))
    }
}

/// Optional caller, for read endpoints that personalise their view.
pub struct MaybeUser(pub Option<Profile>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match principal_id(&parts.headers)? {
            Some(user_id) => Ok(MaybeUser(Some(state.service.principal(user_id).await?))),
            None => Ok(MaybeUser(None)),
        }
    }
}

impl MaybeUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|p| p.id)
    }
}

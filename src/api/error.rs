//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{CivicError, StoreError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError(pub CivicError);

impl From<CivicError> for ApiError {
    fn from(e: CivicError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CivicError::Validation(_) => StatusCode::BAD_REQUEST,
            CivicError::Authorization(_) => StatusCode::FORBIDDEN,
            CivicError::NotFound { .. } => StatusCode::NOT_FOUND,
            CivicError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            CivicError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthorizationError, ValidationError};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                CivicError::from(ValidationError::InvalidVoteKind("sideways".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                CivicError::from(AuthorizationError::AdminRequired { action: "x" }),
                StatusCode::FORBIDDEN,
            ),
            (CivicError::issue_not_found(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (
                CivicError::from(StoreError::Conflict("dup".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                CivicError::from(StoreError::Corrupt("bad row".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }
}

//! Error handling for the civic issue core
//!
//! Core rules raise only `Validation` and `Authorization` errors. Everything
//! coming back from persistence is surfaced unchanged as `Store`, and retry
//! policy belongs to the store client, never to the core.

use thiserror::Error;
use uuid::Uuid;

use crate::blob_store::BlobStoreError;

/// Main error type for the issue core
#[derive(Error, Debug)]
pub enum CivicError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not authorized: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CivicError {
    pub fn issue_not_found(id: Uuid) -> Self {
        CivicError::NotFound { entity: "Issue", id }
    }

    pub fn profile_not_found(id: Uuid) -> Self {
        CivicError::NotFound {
            entity: "Profile",
            id,
        }
    }
}

/// Malformed input rejected by the core's own rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid vote kind '{0}': expected upvote or downvote")]
    InvalidVoteKind(String),

    #[error("Invalid status '{0}': expected open, in_progress, resolved or closed")]
    InvalidStatus(String),

    #[error("Invalid priority '{0}': expected low, medium, high or urgent")]
    InvalidPriority(String),

    #[error("Invalid category '{0}'")]
    InvalidCategory(String),

    #[error("Invalid role '{0}': expected citizen or admin")]
    InvalidRole(String),

    #[error("Invalid sort '{0}': expected newest, oldest, most_voted or priority")]
    InvalidSort(String),

    #[error("Field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("Coordinate out of range: {reason}")]
    InvalidCoordinate { reason: String },

    #[error("Transition from {from} to {to} is not part of the issue lifecycle")]
    TransitionNotAllowed { from: String, to: String },

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),
}

/// Actor lacks the role required for the operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Administrator role required to {action}")]
    AdminRequired { action: &'static str },

    #[error("No authenticated principal")]
    Unauthenticated,

    #[error("No profile for principal {0}")]
    UnknownPrincipal(Uuid),
}

/// I/O failures from the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Failed to upload image: {0}")]
    Blob(#[from] BlobStoreError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for CivicError {
    fn from(e: sqlx::Error) -> Self {
        CivicError::Store(StoreError::Database(e))
    }
}

impl CivicError {
    /// Persistence conflict (e.g. a concurrent vote by the same voter)
    pub fn is_conflict(&self) -> bool {
        matches!(self, CivicError::Store(StoreError::Conflict(_)))
    }
}

pub type CivicResult<T> = Result<T, CivicError>;

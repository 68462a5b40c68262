//! Civic issue reporting core
//!
//! Citizens report issues, vote on them and comment; administrators move
//! issues through their lifecycle. The crate holds the pure engines (vote
//! tally, status machine, notification dispatch), the persistence contract
//! with in-memory and PostgreSQL backends, and an optional HTTP surface.
//!
//! ## Modules
//!
//! - [`votes`] - vote toggling and tallies
//! - [`workflow`] - status transitions
//! - [`events`] - notification events, dispatcher, hub and relay
//! - [`store`] - issue store contract, change feed, backends
//! - [`services`] - view-model façade used by the API
//! - `api` - axum routes (`server` feature)

pub mod analytics;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod models;
pub mod services;
pub mod store;
pub mod votes;
pub mod workflow;

#[cfg(feature = "server")]
pub mod api;

pub use error::{AuthorizationError, CivicError, CivicResult, StoreError, ValidationError};
pub use models::{
    Category, Comment, Issue, IssueId, IssueStatus, Priority, Profile, Role, UserId, Vote,
    VoteKind,
};
pub use services::IssueService;

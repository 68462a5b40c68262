//! Issue Store
//!
//! Persistence contract consumed by the core. The store is the sole writer
//! of truth: every mutation is atomic at the row level, the (issue, voter)
//! pair is unique, and each committed write is published on the
//! [`ChangeFeed`].
//!
//! Backends: [`MemoryStore`] (tests, single-node demo) and, with the
//! `database` feature, [`PgIssueStore`].

pub mod feed;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CivicError, CivicResult, StoreError};
use crate::models::{
    Comment, CommentOrder, Issue, IssueId, IssueStatus, NewComment, NewIssue, Priority, UserId,
    Vote,
};
use crate::votes::VoteSetChange;

pub use feed::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChangeTable, SubscriptionHandle,
};
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgIssueStore;
pub use query::{IssueFilter, IssueSort};

#[async_trait]
pub trait IssueStore: Send + Sync {
    // ── Issues ──

    /// Persist a new `open` issue. Publishes `IssueInserted`.
    async fn create_issue(&self, new: NewIssue) -> CivicResult<Issue>;
    async fn get_issue(&self, id: IssueId) -> CivicResult<Option<Issue>>;
    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort) -> CivicResult<Vec<Issue>>;

    /// Write `status` and `resolved_at`, leaving every other column alone.
    /// Fails with `StoreError::Conflict` unless the stored status is still
    /// `expected`. Publishes `IssueUpdated` carrying the prior row.
    async fn update_status(
        &self,
        id: IssueId,
        expected: IssueStatus,
        status: IssueStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> CivicResult<Issue>;

    /// Write `priority` only. Publishes `IssueUpdated`.
    async fn update_priority(&self, id: IssueId, priority: Priority) -> CivicResult<Issue>;

    // ── Votes ──

    async fn list_votes(&self, issue_id: IssueId) -> CivicResult<Vec<Vote>>;

    /// Votes for several issues in one read (feeds, sorting).
    async fn votes_for_issues(&self, issue_ids: &[IssueId]) -> CivicResult<Vec<Vote>>;

    async fn get_vote(&self, issue_id: IssueId, voter_id: UserId) -> CivicResult<Option<Vote>>;

    /// Insert, update or delete the vote row. Fails with
    /// `StoreError::Conflict` when the row no longer matches what the change
    /// was computed from (e.g. a concurrent vote by the same voter).
    async fn apply_vote_change(&self, change: &VoteSetChange) -> CivicResult<()>;

    // ── Comments ──

    /// Append a comment. Publishes `CommentInserted`.
    async fn create_comment(&self, new: NewComment) -> CivicResult<Comment>;
    async fn list_comments(&self, issue_id: IssueId, order: CommentOrder)
        -> CivicResult<Vec<Comment>>;
    async fn count_comments(&self, issue_id: IssueId) -> CivicResult<usize>;

    // ── Change feed ──

    fn changes(&self) -> ChangeFeed;
}

/// Error for a status write whose precondition no longer holds.
pub(crate) fn status_conflict(id: IssueId, expected: IssueStatus, found: IssueStatus) -> CivicError {
    StoreError::Conflict(format!(
        "issue {} is {}, expected {}; status changed concurrently",
        id, found, expected
    ))
    .into()
}

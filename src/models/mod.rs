//! Domain records for issues, votes, comments and profiles.

pub mod comment;
pub mod issue;
pub mod profile;
pub mod vote;

pub use comment::{Comment, CommentOrder, NewComment};
pub use issue::{Category, GeoPoint, Issue, IssueStatus, NewIssue, Priority};
pub use profile::{Profile, ProfileFilter, Role};
pub use vote::{Vote, VoteKind};

/// Opaque identity of an authenticated principal / profile.
pub type UserId = uuid::Uuid;

/// Opaque identity of an issue.
pub type IssueId = uuid::Uuid;

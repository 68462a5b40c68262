//! Comment records. Append-only, scoped to an issue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

use super::{IssueId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub issue_id: IssueId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub issue_id: IssueId,
    pub author_id: UserId,
    pub body: String,
}

impl NewComment {
    /// Trim the body; blank comments are rejected.
    pub fn new(
        issue_id: IssueId,
        author_id: UserId,
        body: &str,
    ) -> Result<Self, ValidationError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::EmptyField { field: "body" });
        }
        Ok(Self {
            issue_id,
            author_id,
            body: body.to_string(),
        })
    }

    pub fn into_comment(self, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            issue_id: self.issue_id,
            author_id: self.author_id,
            body: self.body,
            created_at,
        }
    }
}

/// Read order for a comment thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentOrder {
    #[default]
    Ascending,
    Descending,
}

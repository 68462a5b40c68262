//! Vote records
//!
//! At most one vote exists per (issue, voter). The store enforces this with a
//! uniqueness constraint; [`crate::votes`] decides which mutation to make.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

use super::{IssueId, UserId};

/// Direction of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "VARCHAR", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Upvote,
    Downvote,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Upvote => "upvote",
            VoteKind::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteKind::Upvote),
            "downvote" => Ok(VoteKind::Downvote),
            other => Err(ValidationError::InvalidVoteKind(other.to_string())),
        }
    }
}

/// A single voter's vote on an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub issue_id: IssueId,
    pub voter_id: UserId,
    #[serde(rename = "vote_type")]
    pub kind: VoteKind,
}

impl Vote {
    pub fn new(issue_id: IssueId, voter_id: UserId, kind: VoteKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue_id,
            voter_id,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_kind_rejects_unknown() {
        assert_eq!("upvote".parse::<VoteKind>().unwrap(), VoteKind::Upvote);
        assert_eq!(
            "sidevote".parse::<VoteKind>(),
            Err(ValidationError::InvalidVoteKind("sidevote".to_string()))
        );
    }

    #[test]
    fn test_vote_serializes_vote_type() {
        let vote = Vote::new(Uuid::new_v4(), Uuid::new_v4(), VoteKind::Downvote);
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["vote_type"], "downvote");
    }
}

//! Vote Tally Engine
//!
//! Pure computation over one issue's vote set. Voting is a toggle:
//!
//! - no existing vote → insert the requested kind
//! - existing vote of the same kind → remove it
//! - existing vote of the other kind → switch it in place
//!
//! The engine returns the [`VoteSetChange`] the store must persist. It holds no
//! state between calls and assumes at most one in-flight mutation per
//! (issue, voter); concurrent duplicates are rejected by the store.

use serde::{Deserialize, Serialize};

use crate::models::{IssueId, UserId, Vote, VoteKind};

/// Aggregate counts for an issue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub upvotes: u32,
    pub downvotes: u32,
    /// `upvotes - downvotes`
    pub net: i64,
}

impl Tally {
    pub fn from_counts(upvotes: u32, downvotes: u32) -> Self {
        Self {
            upvotes,
            downvotes,
            net: i64::from(upvotes) - i64::from(downvotes),
        }
    }
}

/// The persisted mutation implied by a vote request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum VoteSetChange {
    /// First vote by this voter: insert
    Inserted { vote: Vote },
    /// Voter changed direction: update the existing row's kind
    Switched { vote: Vote, previous: VoteKind },
    /// Voter repeated their vote: delete the existing row
    Removed { vote: Vote },
}

impl VoteSetChange {
    /// Decide the mutation for `voter` given their existing vote, if any.
    pub fn resolve(
        existing: Option<&Vote>,
        issue_id: IssueId,
        voter_id: UserId,
        kind: VoteKind,
    ) -> Self {
        match existing {
            None => VoteSetChange::Inserted {
                vote: Vote::new(issue_id, voter_id, kind),
            },
            Some(vote) if vote.kind == kind => VoteSetChange::Removed { vote: vote.clone() },
            Some(vote) => VoteSetChange::Switched {
                vote: Vote {
                    kind,
                    ..vote.clone()
                },
                previous: vote.kind,
            },
        }
    }

    /// The vote row this change touches.
    pub fn vote(&self) -> &Vote {
        match self {
            VoteSetChange::Inserted { vote }
            | VoteSetChange::Switched { vote, .. }
            | VoteSetChange::Removed { vote } => vote,
        }
    }

    /// The voter's vote once the change is applied.
    pub fn resulting_vote(&self) -> Option<VoteKind> {
        match self {
            VoteSetChange::Inserted { vote } | VoteSetChange::Switched { vote, .. } => {
                Some(vote.kind)
            }
            VoteSetChange::Removed { .. } => None,
        }
    }
}

/// All votes cast on a single issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSet {
    issue_id: IssueId,
    votes: Vec<Vote>,
}

impl VoteSet {
    pub fn new(issue_id: IssueId) -> Self {
        Self {
            issue_id,
            votes: Vec::new(),
        }
    }

    /// Build from store rows. Rows belonging to other issues are ignored.
    pub fn from_votes(issue_id: IssueId, votes: impl IntoIterator<Item = Vote>) -> Self {
        Self {
            issue_id,
            votes: votes.into_iter().filter(|v| v.issue_id == issue_id).collect(),
        }
    }

    pub fn issue_id(&self) -> IssueId {
        self.issue_id
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    fn find(&self, voter_id: UserId) -> Option<&Vote> {
        self.votes.iter().find(|v| v.voter_id == voter_id)
    }

    /// The voter's current vote, `None` if they have not voted.
    pub fn current_vote(&self, voter_id: UserId) -> Option<VoteKind> {
        self.find(voter_id).map(|v| v.kind)
    }

    pub fn tally(&self) -> Tally {
        let upvotes = self
            .votes
            .iter()
            .filter(|v| v.kind == VoteKind::Upvote)
            .count();
        let downvotes = self.votes.len() - upvotes;
        Tally::from_counts(upvotes as u32, downvotes as u32)
    }

    /// Apply a vote request and return the change to persist.
    pub fn apply_vote(&mut self, voter_id: UserId, kind: VoteKind) -> VoteSetChange {
        let change = VoteSetChange::resolve(self.find(voter_id), self.issue_id, voter_id, kind);
        self.apply_change(&change);
        change
    }

    /// Bring the set in line with a change decided elsewhere (e.g. by the store).
    pub fn apply_change(&mut self, change: &VoteSetChange) {
        let voter_id = change.vote().voter_id;
        self.votes.retain(|v| v.voter_id != voter_id);
        if let Some(kind) = change.resulting_vote() {
            self.votes.push(Vote {
                kind,
                ..change.vote().clone()
            });
        }
    }

    /// View model for a particular viewer.
    pub fn summary_for(&self, viewer_id: UserId) -> VoteSummary {
        VoteSummary {
            issue_id: self.issue_id,
            tally: self.tally(),
            user_vote: self.current_vote(viewer_id),
        }
    }
}

/// Tally plus the viewing user's vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub issue_id: IssueId,
    #[serde(flatten)]
    pub tally: Tally,
    pub user_vote: Option<VoteKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    #[test]
    fn test_upvote_toggle_then_downvote() {
        let issue = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let mut set = VoteSet::new(issue);

        let change = set.apply_vote(voter, VoteKind::Upvote);
        assert!(matches!(change, VoteSetChange::Inserted { .. }));
        assert_eq!(set.tally(), Tally::from_counts(1, 0));

        let change = set.apply_vote(voter, VoteKind::Upvote);
        assert!(matches!(change, VoteSetChange::Removed { .. }));
        assert_eq!(set.tally(), Tally::from_counts(0, 0));
        assert_eq!(set.current_vote(voter), None);

        set.apply_vote(voter, VoteKind::Downvote);
        assert_eq!(set.tally(), Tally::from_counts(0, 1));
        assert_eq!(set.current_vote(voter), Some(VoteKind::Downvote));
    }

    #[test]
    fn test_switch_keeps_vote_id() {
        let issue = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let mut set = VoteSet::new(issue);

        let first = set.apply_vote(voter, VoteKind::Upvote);
        let switched = set.apply_vote(voter, VoteKind::Downvote);

        match switched {
            VoteSetChange::Switched { vote, previous } => {
                assert_eq!(vote.id, first.vote().id);
                assert_eq!(vote.kind, VoteKind::Downvote);
                assert_eq!(previous, VoteKind::Upvote);
            }
            other => panic!("expected switch, got {:?}", other),
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_two_voters_and_a_bystander() {
        let issue = Uuid::new_v4();
        let mut set = VoteSet::new(issue);
        set.apply_vote(Uuid::new_v4(), VoteKind::Upvote);
        set.apply_vote(Uuid::new_v4(), VoteKind::Upvote);

        let tally = set.tally();
        assert_eq!(tally.upvotes, 2);
        assert_eq!(tally.net, 2);
        assert_eq!(set.current_vote(Uuid::new_v4()), None);
    }

    #[test]
    fn test_from_votes_ignores_other_issues() {
        let issue = Uuid::new_v4();
        let other = Uuid::new_v4();
        let set = VoteSet::from_votes(
            issue,
            vec![
                Vote::new(issue, Uuid::new_v4(), VoteKind::Downvote),
                Vote::new(other, Uuid::new_v4(), VoteKind::Upvote),
            ],
        );
        assert_eq!(set.tally(), Tally::from_counts(0, 1));
    }

    #[test]
    fn test_summary_flattens_tally() {
        let issue = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let mut set = VoteSet::new(issue);
        set.apply_vote(voter, VoteKind::Upvote);

        let json = serde_json::to_value(set.summary_for(voter)).unwrap();
        assert_eq!(json["upvotes"], 1);
        assert_eq!(json["net"], 1);
        assert_eq!(json["user_vote"], "upvote");
    }

    fn vote_kind() -> impl Strategy<Value = VoteKind> {
        prop_oneof![Just(VoteKind::Upvote), Just(VoteKind::Downvote)]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_vote_per_voter(kinds in prop::collection::vec(vote_kind(), 0..40)) {
            let issue = Uuid::new_v4();
            let voter = Uuid::new_v4();
            let mut set = VoteSet::new(issue);
            for kind in kinds {
                set.apply_vote(voter, kind);
                let mine = set.votes().iter().filter(|v| v.voter_id == voter).count();
                prop_assert!(mine <= 1);
            }
        }

        #[test]
        fn prop_tally_is_consistent(
            requests in prop::collection::vec((0usize..5, vote_kind()), 0..60)
        ) {
            let issue = Uuid::new_v4();
            let voters: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
            let mut set = VoteSet::new(issue);
            for (idx, kind) in requests {
                set.apply_vote(voters[idx], kind);
                let tally = set.tally();
                prop_assert_eq!(tally.net, i64::from(tally.upvotes) - i64::from(tally.downvotes));
                prop_assert_eq!((tally.upvotes + tally.downvotes) as usize, set.len());
                prop_assert!(set.len() <= voters.len());
            }
        }

        #[test]
        fn prop_repeat_vote_removes(kind in vote_kind()) {
            let voter = Uuid::new_v4();
            let mut set = VoteSet::new(Uuid::new_v4());
            set.apply_vote(voter, kind);
            let change = set.apply_vote(voter, kind);
            prop_assert!(
                matches!(change, VoteSetChange::Removed { .. }),
                "second identical vote must remove"
            );
            prop_assert!(set.is_empty());
        }
    }
}

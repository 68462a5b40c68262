//! Vote aggregation and the one-vote-per-voter toggle rules.

pub mod tally;

pub use tally::{Tally, VoteSet, VoteSetChange, VoteSummary};

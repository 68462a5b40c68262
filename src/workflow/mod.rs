//! Issue lifecycle rules.

pub mod status;

pub use status::{is_lifecycle_edge, StatusMachine, TransitionOutcome, TransitionPolicy};

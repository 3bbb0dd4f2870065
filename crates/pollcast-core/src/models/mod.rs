//! Data model for polls and ledger entries.
//!
//! # Core Types
//!
//! - [`Poll`] - Poll definition, settings, lifecycle flag and counters
//! - [`PollOption`] - One selectable answer with its vote count
//! - [`Vote`] - The current ledger entry for one identity on one poll
//!
//! # Inputs
//!
//! - [`NewPoll`] / [`PollUpdate`] - Poll lifecycle requests
//! - [`Ballot`] - A vote submission (choices or free text)

mod poll;
mod vote;

pub use poll::{NewPoll, OptionId, Poll, PollId, PollOption, PollSettings, PollUpdate, QuestionType};
pub use vote::{Ballot, Vote, VoteOutcome};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

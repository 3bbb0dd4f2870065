//! Vote model - one ledger entry per (poll, identity).

use super::poll::{OptionId, PollId};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};

/// The current recorded choice(s) or text for one identity on one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub poll_id: PollId,

    /// Exactly one voter identity
    pub voter: Identity,

    /// Selected option ids, empty for text polls
    #[serde(default)]
    pub selected_options: Vec<OptionId>,

    /// Free text, empty for choice polls
    #[serde(default)]
    pub text_response: String,

    /// First time this identity voted on the poll (unix millis)
    pub created_at: u64,

    /// Last time the entry was written (unix millis)
    pub updated_at: u64,
}

/// A vote submission as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    #[serde(default)]
    pub selected_options: Vec<OptionId>,
    #[serde(default)]
    pub text_response: Option<String>,
}

impl Ballot {
    pub fn choices<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OptionId>,
    {
        Self {
            selected_options: ids.into_iter().map(Into::into).collect(),
            text_response: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            selected_options: Vec::new(),
            text_response: Some(text.into()),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote from this identity
    Recorded(Vote),
    /// Replaced this identity's earlier vote
    Replaced(Vote),
}

impl VoteOutcome {
    pub fn vote(&self) -> &Vote {
        match self {
            VoteOutcome::Recorded(vote) | VoteOutcome::Replaced(vote) => vote,
        }
    }

    pub fn into_vote(self) -> Vote {
        match self {
            VoteOutcome::Recorded(vote) | VoteOutcome::Replaced(vote) => vote,
        }
    }

    pub fn is_replacement(&self) -> bool {
        matches!(self, VoteOutcome::Replaced(_))
    }
}

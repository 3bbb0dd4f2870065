//! Read-side operations: poll views, aggregates and "have I voted" checks.
//!
//! Both read the authoritative store directly and never take a poll lock.

use crate::aggregator::percentage;
use crate::engine::PollEngine;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::models::{OptionId, Poll, PollId, QuestionType};
use crate::store::PollStore;
use serde::{Deserialize, Serialize};

/// Per-option statistics for a choice poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionStats {
    pub option_id: OptionId,
    pub text: String,
    pub vote_count: u64,
    pub percentage: u32,
}

/// One free-text response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResponse {
    pub text_response: String,
    pub created_at: u64,
}

/// Aggregates for a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pollType", rename_all = "snake_case")]
pub enum PollStats {
    /// Single or multiple choice poll
    #[serde(rename_all = "camelCase")]
    Choice {
        question_type: QuestionType,
        total_votes: u64,
        total_selections: u64,
        options: Vec<OptionStats>,
    },
    /// Free-text poll, newest response first
    #[serde(rename_all = "camelCase")]
    Text {
        total_votes: u64,
        responses: Vec<TextResponse>,
    },
}

impl PollStats {
    pub fn total_votes(&self) -> u64 {
        match self {
            PollStats::Choice { total_votes, .. } | PollStats::Text { total_votes, .. } => {
                *total_votes
            }
        }
    }
}

/// What a voter previously submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorVote {
    pub selected_options: Vec<OptionId>,
    pub text_response: String,
    pub created_at: u64,
}

/// Answer to "has this identity voted on this poll".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStatus {
    pub has_voted: bool,
    pub can_vote_again: bool,
    pub vote: Option<PriorVote>,
}

impl<S: PollStore> PollEngine<S> {
    /// A poll as `requester` may see it. Counters are zeroed when results are
    /// hidden from them.
    pub fn get_poll_for(&self, poll_id: &PollId, requester: &Identity) -> Result<Poll> {
        let mut poll = self.get_poll(poll_id)?;
        if !results_visible(&poll, requester) {
            poll.total_votes = 0;
            for option in &mut poll.options {
                option.vote_count = 0;
            }
        }
        Ok(poll)
    }

    /// Aggregates for a poll, subject to its results visibility setting.
    pub fn get_aggregates(&self, poll_id: &PollId, requester: &Identity) -> Result<PollStats> {
        let poll = self.get_poll(poll_id)?;
        if !results_visible(&poll, requester) {
            return Err(Error::ResultsHidden);
        }

        if poll.question_type == QuestionType::Text {
            let mut responses: Vec<TextResponse> = self
                .store
                .list_votes(poll_id)?
                .into_iter()
                .filter(|v| !v.text_response.is_empty())
                .map(|v| TextResponse {
                    text_response: v.text_response,
                    created_at: v.created_at,
                })
                .collect();
            responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            return Ok(PollStats::Text {
                total_votes: responses.len() as u64,
                responses,
            });
        }

        let total_selections = poll.total_selections();
        let options = poll
            .options
            .iter()
            .map(|o| OptionStats {
                option_id: o.id.clone(),
                text: o.text.clone(),
                vote_count: o.vote_count,
                percentage: percentage(o.vote_count, total_selections),
            })
            .collect();

        Ok(PollStats::Choice {
            question_type: poll.question_type,
            total_votes: poll.total_votes,
            total_selections,
            options,
        })
    }

    /// Whether `voter` has a ledger entry on the poll and may replace it.
    pub fn check_voted(&self, poll_id: &PollId, voter: &Identity) -> Result<VoteStatus> {
        let poll = self.get_poll(poll_id)?;
        let prior = self.store.get_vote(poll_id, voter)?;
        Ok(VoteStatus {
            has_voted: prior.is_some(),
            can_vote_again: prior.is_none() || poll.settings.allow_multiple_votes,
            vote: prior.map(|v| PriorVote {
                selected_options: v.selected_options,
                text_response: v.text_response,
                created_at: v.created_at,
            }),
        })
    }
}

fn results_visible(poll: &Poll, requester: &Identity) -> bool {
    poll.settings.show_results || poll.is_creator(requester)
}

//! Vote Recorder - the submission state machine.
//!
//! Steps run in order and the first failure short-circuits:
//!
//! 1. Lookup: the poll must exist (`NotFound`)
//! 2. Liveness: inactive or expired polls reject (`PollClosed`); an expired
//!    poll is flipped to inactive on the way out
//! 3. Access: login-gated polls reject anonymous identities (`LoginRequired`)
//! 4. Shape: the ballot must fit the question type (`Validation`)
//! 5. Prior vote lookup for `(poll, identity)`
//! 6. Admission: a prior vote is a `DuplicateVote` unless re-voting is allowed
//! 7. Record: ledger entry and counters commit as one unit
//! 8. Publish: fire-and-forget change signal
//!
//! Steps 1-4 run without the poll lock as a fast rejection path and are
//! re-checked against a fresh read once the lock is held. Steps 5-7 run
//! entirely under the lock. A caller that goes away before step 7 leaves no
//! trace; once step 7 returns the vote stands.

use crate::aggregator;
use crate::engine::PollEngine;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::models::{now_millis, Ballot, OptionId, Poll, PollId, QuestionType, Vote, VoteOutcome};
use crate::store::PollStore;
use std::collections::HashSet;
use tracing::{debug, info};

/// A ballot after shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    options: Vec<OptionId>,
    text: String,
}

impl<S: PollStore> PollEngine<S> {
    /// Submit (or, where allowed, replace) `voter`'s vote on a poll.
    pub async fn submit_vote(
        &self,
        poll_id: &PollId,
        voter: Identity,
        ballot: Ballot,
    ) -> Result<VoteOutcome> {
        let now = now_millis();

        // 1-4 without the lock
        let poll = self.get_poll(poll_id)?;
        if poll.is_active && poll.is_expired(now) {
            self.expire_poll(poll_id, now).await?;
            return Err(Error::PollClosed);
        }
        admit(&poll, &voter, &ballot, now)?;

        let outcome = {
            let guard = self.locks.acquire(poll_id).await;

            let mut poll = self.reload(poll_id)?;
            if poll.is_active && poll.is_expired(now) {
                poll.is_active = false;
                self.store.put_poll(&poll)?;
                drop(guard);
                info!(poll = %poll_id, "poll expired");
                self.notifier.publish(poll_id);
                return Err(Error::PollClosed);
            }
            let selection = admit(&poll, &voter, &ballot, now)?;

            // 5
            let previous = self.store.get_vote(poll_id, &voter)?;

            // 6
            if previous.is_some() && !poll.settings.allow_multiple_votes {
                debug!(poll = %poll_id, voter = %voter.ledger_key(), "duplicate vote rejected");
                return Err(Error::DuplicateVote);
            }

            // 7
            let vote = Vote {
                poll_id: poll_id.clone(),
                voter,
                selected_options: selection.options,
                text_response: selection.text,
                created_at: previous.as_ref().map_or(now, |p| p.created_at),
                updated_at: now,
            };
            aggregator::apply_vote(&mut poll, previous.as_ref(), &vote)?;
            self.store.commit_vote(&poll, &vote)?;

            debug!(
                poll = %poll_id,
                voter = %vote.voter.ledger_key(),
                replaced = previous.is_some(),
                total = poll.total_votes,
                "vote recorded"
            );
            match previous {
                Some(_) => VoteOutcome::Replaced(vote),
                None => VoteOutcome::Recorded(vote),
            }
        };

        // 8
        self.notifier.publish(poll_id);
        Ok(outcome)
    }

    /// Flip an expired poll to inactive under its lock.
    async fn expire_poll(&self, poll_id: &PollId, now: u64) -> Result<()> {
        let flipped = {
            let _guard = self.locks.acquire(poll_id).await;
            let mut poll = self.reload(poll_id)?;
            if poll.is_active && poll.is_expired(now) {
                poll.is_active = false;
                self.store.put_poll(&poll)?;
                true
            } else {
                false
            }
        };
        if flipped {
            info!(poll = %poll_id, "poll expired");
            self.notifier.publish(poll_id);
        }
        Ok(())
    }
}

/// Steps 2-4 against a given view of the poll.
fn admit(poll: &Poll, voter: &Identity, ballot: &Ballot, now: u64) -> Result<Selection> {
    if !poll.is_active || poll.is_expired(now) {
        return Err(Error::PollClosed);
    }
    if poll.settings.require_login && voter.is_anonymous() {
        return Err(Error::LoginRequired);
    }
    validate_shape(poll, ballot)
}

fn validate_shape(poll: &Poll, ballot: &Ballot) -> Result<Selection> {
    match poll.question_type {
        QuestionType::Text => {
            let text = ballot
                .text_response
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if text.is_empty() {
                return Err(Error::validation("text response is required"));
            }
            Ok(Selection {
                options: Vec::new(),
                text: text.to_string(),
            })
        }
        QuestionType::Single | QuestionType::Multiple => {
            let selected = &ballot.selected_options;
            if poll.question_type == QuestionType::Single && selected.len() != 1 {
                return Err(Error::validation("select exactly one option"));
            }
            if selected.is_empty() {
                return Err(Error::validation("select at least one option"));
            }

            let mut seen = HashSet::new();
            for id in selected {
                if !seen.insert(id) {
                    return Err(Error::validation(format!("option {id} selected twice")));
                }
                if !poll.has_option(id) {
                    return Err(Error::validation(format!("invalid option {id}")));
                }
            }
            Ok(Selection {
                options: selected.clone(),
                text: String::new(),
            })
        }
    }
}

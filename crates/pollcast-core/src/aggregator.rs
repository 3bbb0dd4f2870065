//! Counter maintenance for polls.
//!
//! Counters are a deterministic function of the ledger:
//!
//! ```text
//! voteCount(o) = |{ v in ledger(poll) : o in v.selectedOptions }|
//! totalVotes   = |ledger(poll)|
//! ```
//!
//! [`apply_vote`] keeps that equality across one insert or replacement;
//! [`recount`] re-establishes it from scratch.

use crate::error::{Error, Result};
use crate::models::{OptionId, Poll, Vote};
use std::collections::{HashMap, HashSet};

/// Update `poll`'s counters for `next`, which replaces `previous` (if any).
///
/// A new entry adds one to `total_votes` and to each selected option. A
/// replacement leaves the total alone, decrements options only in the old
/// selection and increments options only in the new one.
pub fn apply_vote(poll: &mut Poll, previous: Option<&Vote>, next: &Vote) -> Result<()> {
    let new_set: HashSet<&OptionId> = next.selected_options.iter().collect();

    let old_set: HashSet<&OptionId> = match previous {
        Some(prev) => prev.selected_options.iter().collect(),
        None => HashSet::new(),
    };

    for id in old_set.difference(&new_set) {
        let option = poll
            .option_mut(id)
            .ok_or_else(|| Error::Storage(format!("ledger references unknown option {id}")))?;
        option.vote_count = option.vote_count.checked_sub(1).ok_or_else(|| {
            Error::Storage(format!("vote count underflow on option {id}"))
        })?;
    }

    for id in new_set.difference(&old_set) {
        let option = poll
            .option_mut(id)
            .ok_or_else(|| Error::validation(format!("invalid option {id}")))?;
        option.vote_count += 1;
    }

    if previous.is_none() {
        poll.total_votes += 1;
    }

    Ok(())
}

/// Counters derived from a set of ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub total_votes: u64,
    pub counts: HashMap<OptionId, u64>,
}

impl Tally {
    pub fn count(&self, id: &OptionId) -> u64 {
        self.counts.get(id).copied().unwrap_or(0)
    }
}

/// Count ledger entries per option.
pub fn tally(votes: &[Vote]) -> Tally {
    let mut result = Tally {
        total_votes: votes.len() as u64,
        counts: HashMap::new(),
    };
    for vote in votes {
        let unique: HashSet<&OptionId> = vote.selected_options.iter().collect();
        for id in unique {
            *result.counts.entry(id.clone()).or_insert(0) += 1;
        }
    }
    result
}

/// True when `poll`'s counters match the ledger exactly.
pub fn is_consistent(poll: &Poll, votes: &[Vote]) -> bool {
    let expected = tally(votes);
    poll.total_votes == expected.total_votes
        && poll
            .options
            .iter()
            .all(|o| o.vote_count == expected.count(&o.id))
}

/// Overwrite `poll`'s counters from the ledger. Returns true if anything changed.
pub fn recount(poll: &mut Poll, votes: &[Vote]) -> bool {
    let expected = tally(votes);
    let mut changed = poll.total_votes != expected.total_votes;
    poll.total_votes = expected.total_votes;
    for option in &mut poll.options {
        let count = expected.count(&option.id);
        if option.vote_count != count {
            option.vote_count = count;
            changed = true;
        }
    }
    changed
}

/// `round(100 * count / sum)`, half up; 0 when `sum` is 0.
pub fn percentage(count: u64, sum: u64) -> u32 {
    if sum == 0 {
        return 0;
    }
    ((200 * count + sum) / (2 * sum)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, UserId};
    use crate::models::{PollId, PollSettings, QuestionType};

    fn poll(question_type: QuestionType) -> Poll {
        Poll::new(
            PollId::new("p"),
            UserId::new("owner"),
            question_type,
            vec!["A".into(), "B".into(), "C".into()],
            PollSettings::default(),
            0,
        )
        .unwrap()
    }

    fn vote(voter: &str, ids: &[&OptionId]) -> Vote {
        Vote {
            poll_id: PollId::new("p"),
            voter: Identity::user(voter),
            selected_options: ids.iter().map(|id| (*id).clone()).collect(),
            text_response: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn new_vote_increments() {
        let mut p = poll(QuestionType::Multiple);
        let (a, b) = (p.options[0].id.clone(), p.options[1].id.clone());

        apply_vote(&mut p, None, &vote("u1", &[&a, &b])).unwrap();

        assert_eq!(p.total_votes, 1);
        assert_eq!(p.options[0].vote_count, 1);
        assert_eq!(p.options[1].vote_count, 1);
        assert_eq!(p.options[2].vote_count, 0);
        assert_eq!(p.total_selections(), 2);
    }

    #[test]
    fn replacement_moves_only_the_difference() {
        let mut p = poll(QuestionType::Multiple);
        let ids: Vec<OptionId> = p.options.iter().map(|o| o.id.clone()).collect();

        let first = vote("u1", &[&ids[0], &ids[1]]);
        apply_vote(&mut p, None, &first).unwrap();
        let second = vote("u1", &[&ids[1], &ids[2]]);
        apply_vote(&mut p, Some(&first), &second).unwrap();

        assert_eq!(p.total_votes, 1);
        assert_eq!(p.options[0].vote_count, 0);
        assert_eq!(p.options[1].vote_count, 1);
        assert_eq!(p.options[2].vote_count, 1);
        assert!(is_consistent(&p, &[second]));
    }

    #[test]
    fn text_replacement_has_no_counter_effect() {
        let mut p = poll(QuestionType::Single);
        p.options.clear();
        p.question_type = QuestionType::Text;

        let mut first = vote("u1", &[]);
        first.text_response = "one".into();
        apply_vote(&mut p, None, &first).unwrap();
        let mut second = first.clone();
        second.text_response = "two".into();
        apply_vote(&mut p, Some(&first), &second).unwrap();

        assert_eq!(p.total_votes, 1);
    }

    #[test]
    fn underflow_is_reported() {
        let mut p = poll(QuestionType::Single);
        let a = p.options[0].id.clone();
        let b = p.options[1].id.clone();
        let prev = vote("u1", &[&a]);
        let err = apply_vote(&mut p, Some(&prev), &vote("u1", &[&b])).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn recount_repairs_drift() {
        let mut p = poll(QuestionType::Single);
        let a = p.options[0].id.clone();
        let votes = vec![vote("u1", &[&a]), vote("u2", &[&a])];

        // double-counted replacement left behind by a buggy writer
        p.options[0].vote_count = 3;
        p.options[1].vote_count = 1;
        p.total_votes = 2;
        assert!(!is_consistent(&p, &votes));

        assert!(recount(&mut p, &votes));
        assert!(is_consistent(&p, &votes));
        assert_eq!(p.options[0].vote_count, 2);
        assert_eq!(p.options[1].vote_count, 0);
        assert!(!recount(&mut p, &votes));
    }

    #[test]
    fn percentages() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(5, 5), 100);
    }
}

//! Poll Store and Vote Ledger contract, plus an in-memory implementation.
//!
//! Implementations must make [`PollStore::commit_vote`] and
//! [`PollStore::delete_poll`] atomic: a reader never observes a ledger entry
//! without the matching counters, or a poll's votes outliving the poll.

use crate::error::Result;
use crate::identity::Identity;
use crate::models::{Poll, PollId, Vote};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Storage operations for polls and their ledger entries.
pub trait PollStore: Send + Sync {
    /// Get a poll by id.
    fn get_poll(&self, id: &PollId) -> Result<Option<Poll>>;

    /// Store a poll definition, replacing any previous version.
    fn put_poll(&self, poll: &Poll) -> Result<()>;

    /// Get the ledger entry for `voter` on a poll.
    fn get_vote(&self, poll_id: &PollId, voter: &Identity) -> Result<Option<Vote>>;

    /// All ledger entries for a poll, in no particular order.
    fn list_votes(&self, poll_id: &PollId) -> Result<Vec<Vote>>;

    /// Write the ledger entry and the poll's updated counters as one unit.
    fn commit_vote(&self, poll: &Poll, vote: &Vote) -> Result<()>;

    /// Delete a poll and every ledger entry for it as one unit.
    /// Returns true if the poll existed.
    fn delete_poll(&self, id: &PollId) -> Result<bool>;
}

#[derive(Debug)]
struct PollRecord {
    poll: Poll,
    votes: HashMap<String, Vote>,
}

/// Process-local store, used by tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    polls: RwLock<HashMap<PollId, PollRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of polls held.
    pub fn poll_count(&self) -> usize {
        self.polls.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl PollStore for MemoryStore {
    fn get_poll(&self, id: &PollId) -> Result<Option<Poll>> {
        let polls = self.polls.read().unwrap_or_else(PoisonError::into_inner);
        Ok(polls.get(id).map(|record| record.poll.clone()))
    }

    fn put_poll(&self, poll: &Poll) -> Result<()> {
        let mut polls = self.polls.write().unwrap_or_else(PoisonError::into_inner);
        polls
            .entry(poll.id.clone())
            .and_modify(|record| record.poll = poll.clone())
            .or_insert_with(|| PollRecord {
                poll: poll.clone(),
                votes: HashMap::new(),
            });
        Ok(())
    }

    fn get_vote(&self, poll_id: &PollId, voter: &Identity) -> Result<Option<Vote>> {
        let polls = self.polls.read().unwrap_or_else(PoisonError::into_inner);
        Ok(polls
            .get(poll_id)
            .and_then(|record| record.votes.get(&voter.ledger_key()))
            .cloned())
    }

    fn list_votes(&self, poll_id: &PollId) -> Result<Vec<Vote>> {
        let polls = self.polls.read().unwrap_or_else(PoisonError::into_inner);
        Ok(polls
            .get(poll_id)
            .map(|record| record.votes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn commit_vote(&self, poll: &Poll, vote: &Vote) -> Result<()> {
        let mut polls = self.polls.write().unwrap_or_else(PoisonError::into_inner);
        let record = polls
            .entry(poll.id.clone())
            .or_insert_with(|| PollRecord {
                poll: poll.clone(),
                votes: HashMap::new(),
            });
        record.poll = poll.clone();
        record.votes.insert(vote.voter.ledger_key(), vote.clone());
        Ok(())
    }

    fn delete_poll(&self, id: &PollId) -> Result<bool> {
        let mut polls = self.polls.write().unwrap_or_else(PoisonError::into_inner);
        Ok(polls.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;
    use crate::models::{OptionId, PollSettings, QuestionType};

    fn poll(id: &str) -> Poll {
        Poll::new(
            PollId::new(id),
            UserId::new("alice"),
            QuestionType::Single,
            vec!["A".into(), "B".into()],
            PollSettings::default(),
            0,
        )
        .unwrap()
    }

    fn vote(poll: &Poll, voter: Identity) -> Vote {
        Vote {
            poll_id: poll.id.clone(),
            voter,
            selected_options: vec![poll.options[0].id.clone()],
            text_response: String::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn poll_roundtrip() {
        let store = MemoryStore::new();
        let p = poll("p1");
        store.put_poll(&p).unwrap();
        assert_eq!(store.get_poll(&p.id).unwrap(), Some(p));
        assert!(store.get_poll(&PollId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn commit_replaces_entry_per_identity() {
        let store = MemoryStore::new();
        let mut p = poll("p1");
        store.put_poll(&p).unwrap();

        let voter = Identity::user("bob");
        p.total_votes = 1;
        store.commit_vote(&p, &vote(&p, voter.clone())).unwrap();

        let mut second = vote(&p, voter.clone());
        second.selected_options = vec![OptionId::new("other")];
        store.commit_vote(&p, &second).unwrap();

        let votes = store.list_votes(&p.id).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(store.get_vote(&p.id, &voter).unwrap(), Some(second));
        assert_eq!(store.get_poll(&p.id).unwrap().unwrap().total_votes, 1);
    }

    #[test]
    fn put_poll_keeps_ledger() {
        let store = MemoryStore::new();
        let p = poll("p1");
        store.commit_vote(&p, &vote(&p, Identity::user("bob"))).unwrap();
        store.put_poll(&p).unwrap();
        assert_eq!(store.list_votes(&p.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades() {
        let store = MemoryStore::new();
        let p = poll("p1");
        store.commit_vote(&p, &vote(&p, Identity::user("bob"))).unwrap();

        assert!(store.delete_poll(&p.id).unwrap());
        assert!(!store.delete_poll(&p.id).unwrap());
        assert!(store.list_votes(&p.id).unwrap().is_empty());
        assert_eq!(store.poll_count(), 0);
    }
}

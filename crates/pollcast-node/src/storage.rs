//! Persistent poll store using RocksDB.
//!
//! Layout:
//!
//! ```text
//! poll:{poll_id}                 -> Poll (JSON)
//! vote:{poll_id}:{ledger_key}    -> Vote (JSON)
//! ```
//!
//! Vote commits and poll deletes go through a single `WriteBatch` so the
//! ledger and the counters are never observed out of step.

use crate::error::Result;
use pollcast_core::{Error as CoreError, Identity, Poll, PollId, PollStore, Vote};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;

/// Storage backend for polls and ledger entries.
pub struct Storage {
    db: DB,
}

fn storage_err(e: rocksdb::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn poll_key(id: &PollId) -> String {
    format!("poll:{}", id)
}

fn vote_prefix(poll_id: &PollId) -> String {
    format!("vote:{}:", poll_id)
}

fn vote_key(poll_id: &PollId, voter: &Identity) -> String {
    format!("vote:{}:{}", poll_id, voter.ledger_key())
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Keys of every ledger entry for a poll.
    fn vote_keys(&self, poll_id: &PollId) -> pollcast_core::Result<Vec<Box<[u8]>>> {
        let prefix = vote_prefix(poll_id);
        let mut keys = Vec::new();

        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            if key.starts_with(prefix.as_bytes()) {
                keys.push(key);
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// List all polls.
    pub fn list_polls(&self) -> Result<Vec<Poll>> {
        let prefix = b"poll:";
        let mut polls = Vec::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                polls.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(polls)
    }
}

impl PollStore for Storage {
    fn get_poll(&self, id: &PollId) -> pollcast_core::Result<Option<Poll>> {
        match self.db.get(poll_key(id).as_bytes()).map_err(storage_err)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put_poll(&self, poll: &Poll) -> pollcast_core::Result<()> {
        let value = serde_json::to_vec(poll)?;
        self.db
            .put(poll_key(&poll.id).as_bytes(), value)
            .map_err(storage_err)
    }

    fn get_vote(&self, poll_id: &PollId, voter: &Identity) -> pollcast_core::Result<Option<Vote>> {
        match self
            .db
            .get(vote_key(poll_id, voter).as_bytes())
            .map_err(storage_err)?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn list_votes(&self, poll_id: &PollId) -> pollcast_core::Result<Vec<Vote>> {
        let prefix = vote_prefix(poll_id);
        let mut votes = Vec::new();

        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, value) = item.map_err(storage_err)?;
            if key.starts_with(prefix.as_bytes()) {
                votes.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(votes)
    }

    fn commit_vote(&self, poll: &Poll, vote: &Vote) -> pollcast_core::Result<()> {
        let mut batch = WriteBatch::default();
        batch.put(poll_key(&poll.id).as_bytes(), serde_json::to_vec(poll)?);
        batch.put(
            vote_key(&vote.poll_id, &vote.voter).as_bytes(),
            serde_json::to_vec(vote)?,
        );
        self.db.write(batch).map_err(storage_err)
    }

    fn delete_poll(&self, id: &PollId) -> pollcast_core::Result<bool> {
        let key = poll_key(id);
        if self.db.get(key.as_bytes()).map_err(storage_err)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        for vote in self.vote_keys(id)? {
            batch.delete(vote);
        }
        batch.delete(key.as_bytes());
        self.db.write(batch).map_err(storage_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollcast_core::{PollSettings, QuestionType, UserId};
    use tempfile::tempdir;

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

    fn vote(poll: &Poll, voter: Identity, option: usize) -> Vote {
        Vote {
            poll_id: poll.id.clone(),
            voter,
            selected_options: vec![poll.options[option].id.clone()],
            text_response: String::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn poll_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let p = poll("abc123");
        storage.put_poll(&p).unwrap();
        assert_eq!(storage.get_poll(&p.id).unwrap(), Some(p));
        assert!(storage.get_poll(&PollId::new("zzz")).unwrap().is_none());
    }

    #[test]
    fn commit_writes_poll_and_vote() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut p = poll("abc");
        p.total_votes = 1;
        p.options[0].vote_count = 1;
        let bob = Identity::user("bob");
        let v = vote(&p, bob.clone(), 0);
        storage.commit_vote(&p, &v).unwrap();

        assert_eq!(storage.get_poll(&p.id).unwrap().unwrap().total_votes, 1);
        assert_eq!(storage.get_vote(&p.id, &bob).unwrap(), Some(v));
        assert!(storage
            .get_vote(&p.id, &Identity::user("carol"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn votes_scoped_to_poll() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let a = poll("aaa");
        let b = poll("bbb");
        storage.commit_vote(&a, &vote(&a, Identity::user("u1"), 0)).unwrap();
        storage.commit_vote(&a, &vote(&a, Identity::user("u2"), 1)).unwrap();
        storage
            .commit_vote(&b, &vote(&b, Identity::anonymous_from_origin("10.0.0.1"), 0))
            .unwrap();

        assert_eq!(storage.list_votes(&a.id).unwrap().len(), 2);
        assert_eq!(storage.list_votes(&b.id).unwrap().len(), 1);
        assert_eq!(storage.list_polls().unwrap().len(), 2);
    }

    #[test]
    fn delete_cascades_to_ledger() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let a = poll("aaa");
        let b = poll("bbb");
        storage.commit_vote(&a, &vote(&a, Identity::user("u1"), 0)).unwrap();
        storage.commit_vote(&b, &vote(&b, Identity::user("u1"), 0)).unwrap();

        assert!(storage.delete_poll(&a.id).unwrap());
        assert!(!storage.delete_poll(&a.id).unwrap());
        assert!(storage.get_poll(&a.id).unwrap().is_none());
        assert!(storage.list_votes(&a.id).unwrap().is_empty());
        assert_eq!(storage.list_votes(&b.id).unwrap().len(), 1);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let p = poll("persist");
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.commit_vote(&p, &vote(&p, Identity::user("u1"), 1)).unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        assert!(storage.get_poll(&p.id).unwrap().is_some());
        assert_eq!(storage.list_votes(&p.id).unwrap().len(), 1);
    }
}

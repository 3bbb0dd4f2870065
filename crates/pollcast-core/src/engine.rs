//! Poll engine - shared state for the vote path and poll lifecycle.
//!
//! Every mutation of a poll (vote commit, expiry flip, update, close, delete,
//! reconcile) runs under that poll's serialization point, a per-poll async
//! mutex. Polls never share a lock, so unrelated polls proceed in parallel.
//!
//! The vote path lives in [`crate::recorder`], read-side operations in
//! [`crate::results`].

use crate::aggregator;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::models::{now_millis, NewPoll, Poll, PollId, PollUpdate};
use crate::notifier::Notifier;
use crate::store::PollStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// Per-poll serialization points.
#[derive(Default)]
pub(crate) struct PollLocks {
    locks: StdMutex<HashMap<PollId, Arc<Mutex<()>>>>,
}

impl PollLocks {
    /// Wait for exclusive access to `poll_id`.
    pub(crate) async fn acquire(&self, poll_id: &PollId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(poll_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    pub(crate) fn forget(&self, poll_id: &PollId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(poll_id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// The poll/vote consistency and notification engine.
pub struct PollEngine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) locks: PollLocks,
}

impl<S: PollStore> PollEngine<S> {
    pub fn new(store: Arc<S>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            notifier,
            locks: PollLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Load a poll or fail with [`Error::NotFound`].
    pub fn get_poll(&self, poll_id: &PollId) -> Result<Poll> {
        self.store.get_poll(poll_id)?.ok_or(Error::NotFound)
    }

    /// Re-read a poll once its lock is held. A poll deleted in the meantime
    /// also loses its lock entry.
    pub(crate) fn reload(&self, poll_id: &PollId) -> Result<Poll> {
        let poll = self.get_poll(poll_id);
        if let Err(Error::NotFound) = poll {
            self.locks.forget(poll_id);
        }
        poll
    }

    /// Create a poll owned by `creator`. Anonymous callers cannot own polls.
    pub async fn create_poll(&self, creator: &Identity, request: NewPoll) -> Result<Poll> {
        let owner = creator.user_id().ok_or(Error::LoginRequired)?;
        let now = now_millis();
        let poll = Poll::new(
            PollId::generate(owner, now),
            owner.clone(),
            request.question_type,
            request.options,
            request.settings,
            now,
        )?;
        self.store.put_poll(&poll)?;
        info!(poll = %poll.id, creator = %owner, kind = ?poll.question_type, "poll created");
        Ok(poll)
    }

    /// Apply a creator's update. Options are frozen once voting has started.
    pub async fn update_poll(
        &self,
        poll_id: &PollId,
        requester: &Identity,
        update: PollUpdate,
    ) -> Result<Poll> {
        self.get_poll(poll_id)?;
        let poll = {
            let _guard = self.locks.acquire(poll_id).await;
            let mut poll = self.reload(poll_id)?;
            if !poll.is_creator(requester) {
                return Err(Error::Forbidden);
            }
            if let Some(options) = update.options {
                poll.replace_options(options)?;
            }
            if let Some(settings) = update.settings {
                poll.settings = settings;
            }
            if let Some(is_active) = update.is_active {
                poll.is_active = is_active;
            }
            self.store.put_poll(&poll)?;
            poll
        };
        info!(poll = %poll_id, "poll updated");
        self.notifier.publish(poll_id);
        Ok(poll)
    }

    /// Close a poll on behalf of its creator.
    pub async fn close_poll(&self, poll_id: &PollId, requester: &Identity) -> Result<Poll> {
        self.close(poll_id, Some(requester)).await
    }

    /// Close a poll without an ownership check (operator action).
    pub async fn admin_close_poll(&self, poll_id: &PollId) -> Result<Poll> {
        self.close(poll_id, None).await
    }

    async fn close(&self, poll_id: &PollId, requester: Option<&Identity>) -> Result<Poll> {
        self.get_poll(poll_id)?;
        let poll = {
            let _guard = self.locks.acquire(poll_id).await;
            let mut poll = self.reload(poll_id)?;
            if requester.is_some_and(|r| !poll.is_creator(r)) {
                return Err(Error::Forbidden);
            }
            poll.is_active = false;
            self.store.put_poll(&poll)?;
            poll
        };
        info!(poll = %poll_id, "poll closed");
        self.notifier.publish(poll_id);
        Ok(poll)
    }

    /// Delete a poll and its ledger on behalf of its creator.
    pub async fn delete_poll(&self, poll_id: &PollId, requester: &Identity) -> Result<()> {
        self.delete(poll_id, Some(requester)).await
    }

    /// Delete a poll and its ledger without an ownership check (operator action).
    pub async fn admin_delete_poll(&self, poll_id: &PollId) -> Result<()> {
        self.delete(poll_id, None).await
    }

    async fn delete(&self, poll_id: &PollId, requester: Option<&Identity>) -> Result<()> {
        self.get_poll(poll_id)?;
        {
            let _guard = self.locks.acquire(poll_id).await;
            let poll = self.reload(poll_id)?;
            if requester.is_some_and(|r| !poll.is_creator(r)) {
                return Err(Error::Forbidden);
            }
            if !self.store.delete_poll(poll_id)? {
                return Err(Error::NotFound);
            }
        }
        self.locks.forget(poll_id);
        info!(poll = %poll_id, "poll deleted");
        self.notifier.publish(poll_id);
        Ok(())
    }

    /// Recompute a poll's counters from its ledger. Returns true if drift was repaired.
    pub async fn reconcile_poll(&self, poll_id: &PollId) -> Result<bool> {
        self.get_poll(poll_id)?;
        let repaired = {
            let _guard = self.locks.acquire(poll_id).await;
            let mut poll = self.reload(poll_id)?;
            let votes = self.store.list_votes(poll_id)?;
            let repaired = aggregator::recount(&mut poll, &votes);
            if repaired {
                self.store.put_poll(&poll)?;
            }
            repaired
        };
        if repaired {
            tracing::warn!(poll = %poll_id, "counter drift repaired");
            self.notifier.publish(poll_id);
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ballot, PollSettings, QuestionType};
    use crate::store::MemoryStore;

    fn engine() -> PollEngine<MemoryStore> {
        PollEngine::new(Arc::new(MemoryStore::new()), Arc::new(Notifier::default()))
    }

    fn choice(options: &[&str]) -> NewPoll {
        NewPoll {
            question_type: QuestionType::Single,
            options: options.iter().map(|s| s.to_string()).collect(),
            settings: PollSettings::default(),
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let engine = engine();
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();

        let loaded = engine.get_poll(&poll.id).unwrap();
        assert_eq!(loaded, poll);
        assert!(loaded.is_creator(&owner));
        assert!(matches!(
            engine.get_poll(&PollId::new("missing")),
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn anonymous_cannot_create() {
        let engine = engine();
        let anon = Identity::anonymous_from_origin("10.0.0.1");
        assert!(matches!(
            engine.create_poll(&anon, choice(&["A", "B"])).await,
            Err(Error::LoginRequired)
        ));
    }

    #[tokio::test]
    async fn only_creator_mutates() {
        let engine = engine();
        let owner = Identity::user("alice");
        let other = Identity::user("mallory");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();

        assert!(matches!(
            engine.close_poll(&poll.id, &other).await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            engine.delete_poll(&poll.id, &other).await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            engine
                .update_poll(&poll.id, &other, PollUpdate::default())
                .await,
            Err(Error::Forbidden)
        ));

        let closed = engine.close_poll(&poll.id, &owner).await.unwrap();
        assert!(!closed.is_active);
    }

    #[tokio::test]
    async fn update_freezes_options_after_voting() {
        let engine = engine();
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();

        let update = PollUpdate {
            options: Some(vec!["C".into(), "D".into()]),
            ..Default::default()
        };
        let updated = engine.update_poll(&poll.id, &owner, update).await.unwrap();
        assert_eq!(updated.options[0].text, "C");

        let c = updated.options[0].id.clone();
        engine
            .submit_vote(&poll.id, Identity::user("bob"), Ballot::choices([&c]))
            .await
            .unwrap();

        let update = PollUpdate {
            options: Some(vec!["E".into(), "F".into()]),
            ..Default::default()
        };
        assert!(matches!(
            engine.update_poll(&poll.id, &owner, update).await,
            Err(Error::Validation(_))
        ));

        let settings_only = PollUpdate {
            settings: Some(PollSettings {
                show_results: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = engine
            .update_poll(&poll.id, &owner, settings_only)
            .await
            .unwrap();
        assert!(!updated.settings.show_results);
        assert_eq!(updated.options[0].vote_count, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_ledger() {
        let engine = engine();
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();
        let a = poll.options[0].id.clone();
        for voter in ["u1", "u2", "u3"] {
            engine
                .submit_vote(&poll.id, Identity::user(voter), Ballot::choices([&a]))
                .await
                .unwrap();
        }

        engine.delete_poll(&poll.id, &owner).await.unwrap();

        assert!(engine.store().list_votes(&poll.id).unwrap().is_empty());
        assert!(matches!(engine.get_poll(&poll.id), Err(Error::NotFound)));
        assert!(matches!(
            engine.admin_delete_poll(&poll.id).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_ids_leave_no_lock_entries() {
        let engine = engine();
        let stranger = Identity::anonymous_from_origin("198.51.100.7");

        for i in 0..100 {
            let id = PollId::new(format!("missing-{i}"));
            assert!(matches!(
                engine.close_poll(&id, &stranger).await,
                Err(Error::NotFound)
            ));
            assert!(matches!(
                engine.update_poll(&id, &stranger, PollUpdate::default()).await,
                Err(Error::NotFound)
            ));
            assert!(matches!(
                engine.delete_poll(&id, &stranger).await,
                Err(Error::NotFound)
            ));
            assert!(matches!(
                engine.reconcile_poll(&id).await,
                Err(Error::NotFound)
            ));
            assert!(matches!(
                engine
                    .submit_vote(&id, stranger.clone(), Ballot::text("hi"))
                    .await,
                Err(Error::NotFound)
            ));
        }
        assert_eq!(engine.locks.len(), 0);
    }

    #[tokio::test]
    async fn deleted_poll_releases_its_lock_entry() {
        let engine = Arc::new(engine());
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();

        // Hold the poll's lock so a close queues up behind the delete.
        let guard = engine.locks.acquire(&poll.id).await;
        let closer = {
            let engine = Arc::clone(&engine);
            let poll_id = poll.id.clone();
            tokio::spawn(async move { engine.admin_close_poll(&poll_id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(engine.store().delete_poll(&poll.id).unwrap());
        drop(guard);

        assert!(matches!(closer.await.unwrap(), Err(Error::NotFound)));
        assert_eq!(engine.locks.len(), 0);
    }

    #[tokio::test]
    async fn lifecycle_changes_are_published() {
        let engine = engine();
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();

        let mut observer = engine.notifier().observer();
        observer.subscribe(&poll.id);

        engine.admin_close_poll(&poll.id).await.unwrap();
        assert_eq!(observer.changed().await.poll_id, poll.id);
    }

    #[tokio::test]
    async fn reconcile_repairs_drift() {
        let engine = engine();
        let owner = Identity::user("alice");
        let poll = engine.create_poll(&owner, choice(&["A", "B"])).await.unwrap();
        let a = poll.options[0].id.clone();
        engine
            .submit_vote(&poll.id, Identity::user("bob"), Ballot::choices([&a]))
            .await
            .unwrap();

        let mut drifted = engine.get_poll(&poll.id).unwrap();
        drifted.options[0].vote_count = 7;
        engine.store().put_poll(&drifted).unwrap();

        assert!(engine.reconcile_poll(&poll.id).await.unwrap());
        assert_eq!(engine.get_poll(&poll.id).unwrap().options[0].vote_count, 1);
        assert!(!engine.reconcile_poll(&poll.id).await.unwrap());
    }
}

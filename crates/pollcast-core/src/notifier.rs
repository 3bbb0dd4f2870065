//! Per-poll publish/subscribe fan-out.
//!
//! A topic per poll id maps to the observers subscribed to it. [`Notifier::publish`]
//! pushes a content-free [`PollChanged`] into each observer's bounded buffer with
//! `try_send`, so it never waits on a slow observer. A full buffer already holds a
//! pending signal for that observer, so dropping the extra one loses nothing.
//!
//! Observers are process-local. Each observer holds a sender to its own buffer,
//! so the buffer never closes while the observer is alive, and dropping an
//! [`Observer`] removes it from every topic it joined.

use crate::models::PollId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Default per-observer signal buffer.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 16;

/// "This poll changed" signal. Observers re-read authoritative state on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollChanged {
    pub poll_id: PollId,
}

/// Handle identifying one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Registry {
    /// poll id -> subscribed observers
    topics: HashMap<PollId, HashMap<ObserverId, mpsc::Sender<PollChanged>>>,
    /// observer -> polls it joined, for cleanup on drop
    memberships: HashMap<ObserverId, HashSet<PollId>>,
}

/// Poll change notifier.
pub struct Notifier {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl Notifier {
    /// Create a notifier whose observers buffer up to `capacity` signals.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a new observer with no subscriptions.
    pub fn observer(self: &Arc<Self>) -> Observer {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .memberships
            .insert(id, HashSet::new());
        Observer {
            id,
            tx,
            rx,
            notifier: Arc::clone(self),
        }
    }

    fn subscribe(&self, observer: ObserverId, tx: &mpsc::Sender<PollChanged>, poll_id: &PollId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry
            .topics
            .entry(poll_id.clone())
            .or_default()
            .insert(observer, tx.clone());
        registry
            .memberships
            .entry(observer)
            .or_default()
            .insert(poll_id.clone());
        debug!(poll = %poll_id, observer = observer.0, "observer subscribed");
    }

    fn unsubscribe(&self, observer: ObserverId, poll_id: &PollId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        remove_from_topic(&mut registry.topics, poll_id, observer);
        if let Some(polls) = registry.memberships.get_mut(&observer) {
            polls.remove(poll_id);
        }
        debug!(poll = %poll_id, observer = observer.0, "observer unsubscribed");
    }

    fn remove_observer(&self, observer: ObserverId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(polls) = registry.memberships.remove(&observer) {
            for poll_id in &polls {
                remove_from_topic(&mut registry.topics, poll_id, observer);
            }
        }
    }

    /// Signal every current subscriber of `poll_id`. Returns how many were signalled.
    ///
    /// Never blocks and never fails.
    pub fn publish(&self, poll_id: &PollId) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = registry.topics.get(poll_id) else {
            return 0;
        };

        let mut delivered = 0;
        for tx in subscribers.values() {
            let signal = PollChanged {
                poll_id: poll_id.clone(),
            };
            // Full means a signal is already pending for that observer.
            if let Ok(()) | Err(TrySendError::Full(_)) = tx.try_send(signal) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of observers subscribed to `poll_id`.
    pub fn subscriber_count(&self, poll_id: &PollId) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .get(poll_id)
            .map_or(0, HashMap::len)
    }

    /// Number of polls with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .len()
    }
}

fn remove_from_topic(
    topics: &mut HashMap<PollId, HashMap<ObserverId, mpsc::Sender<PollChanged>>>,
    poll_id: &PollId,
    observer: ObserverId,
) {
    if let Some(subscribers) = topics.get_mut(poll_id) {
        subscribers.remove(&observer);
        if subscribers.is_empty() {
            topics.remove(poll_id);
        }
    }
}

/// A subscriber to poll change signals.
pub struct Observer {
    id: ObserverId,
    tx: mpsc::Sender<PollChanged>,
    rx: mpsc::Receiver<PollChanged>,
    notifier: Arc<Notifier>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Start receiving signals for `poll_id`.
    pub fn subscribe(&self, poll_id: &PollId) {
        self.notifier.subscribe(self.id, &self.tx, poll_id);
    }

    /// Stop receiving signals for `poll_id`.
    pub fn unsubscribe(&self, poll_id: &PollId) {
        self.notifier.unsubscribe(self.id, poll_id);
    }

    /// Wait for the next change signal.
    pub async fn changed(&mut self) -> PollChanged {
        match self.rx.recv().await {
            Some(signal) => signal,
            // `self.tx` keeps the buffer open
            None => std::future::pending().await,
        }
    }

    /// Take a pending signal without waiting.
    pub fn try_changed(&mut self) -> Option<PollChanged> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.notifier.remove_observer(self.id);
    }
}

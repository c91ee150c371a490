//! Event Broadcaster: fans ledger events out to any number of observers.
//!
//! Each subscriber owns a bounded queue. Delivery never waits: a full queue
//! drops the event for that subscriber only, and a closed one is pruned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::events::LedgerEvent;
use crate::observability::migration_metrics;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

#[derive(Default)]
struct SubscriberSet {
    next_id: u64,
    senders: HashMap<u64, mpsc::Sender<LedgerEvent>>,
}

type Registry = Mutex<SubscriberSet>;

fn lock(registry: &Registry) -> MutexGuard<'_, SubscriberSet> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

pub struct EventBroadcaster {
    registry: Arc<Registry>,
    buffer: usize,
}

impl EventBroadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(SubscriberSet::default())),
            buffer: buffer.max(1),
        }
    }

    /// Register an observer whose queue starts with `initial`.
    pub fn subscribe(&self, initial: LedgerEvent) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        // A fresh channel always has room for one event.
        let _ = sender.try_send(initial);

        let mut set = lock(&self.registry);
        let id = set.next_id;
        set.next_id += 1;
        set.senders.insert(id, sender);
        debug!(subscriber = id, subscribers = set.senders.len(), "Observer subscribed");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn broadcast(&self, event: &LedgerEvent) -> BroadcastReport {
        let targets: Vec<(u64, mpsc::Sender<LedgerEvent>)> = lock(&self.registry)
            .senders
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id, event = event.kind(), "Observer queue full; event dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut set = lock(&self.registry);
            for id in &closed {
                set.senders.remove(id);
            }
            report.pruned = closed.len();
            debug!(pruned = report.pruned, "Removed closed observers");
        }

        migration_metrics().record_delivery(report.delivered, report.dropped);
        report
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).senders.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("buffer", &self.buffer)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// An observer's end of the stream. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<LedgerEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event; `None` once the broadcaster is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LedgerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently queued, without waiting.
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).senders.remove(&self.id);
        }
    }
}

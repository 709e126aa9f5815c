//! In-memory publish/subscribe fan-out to live dashboard clients
//!
//! Every successful ingestion produces a small [`Envelope`]
//! (`{"event": <name>, "data": <payload>}`) that the [`Hub`] copies into each
//! subscriber's bounded buffer.
//!
//! ## Delivery rules
//!
//! - `broadcast` never waits: a full buffer discards the message for that
//!   subscriber only, a closed receiver removes the subscriber.
//! - The subscriber map lock is held only while iterating the map, never
//!   across a network write (clients drain their own [`Subscription`]).

mod envelope;

pub use envelope::{Envelope, EventKind};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifier handed out by [`Hub::register`].
pub type SubscriberId = u64;

/// Fan-out hub shared between ingestion and connection handlers.
///
/// Cloning is cheap; all clones share the same subscriber set.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<Envelope>>>>,
    next_id: AtomicU64,
    buffer: usize,
    dropped: AtomicU64,
}

/// A registered subscriber's receiving end.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<Envelope>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next envelope. `None` once the subscriber was unregistered.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.recv().await
    }

    /// Take an already-buffered envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.try_recv().ok()
    }
}

impl Hub {
    /// Create a hub whose subscribers each buffer up to `buffer` envelopes
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Arc<Envelope>>>> {
        // The map stays consistent even if a holder panicked mid-iteration
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber
    pub fn register(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let count = {
            let mut subscribers = self.subscribers();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        tracing::debug!(subscriber = id, subscribers = count, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "Subscriber unregistered");
        }
        removed
    }

    /// Deliver an envelope to every live subscriber.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        let envelope = Arc::new(envelope);
        let mut delivered = 0;
        let mut dropped = 0u64;
        let mut closed = Vec::new();

        {
            let mut subscribers = self.subscribers();
            for (id, sender) in subscribers.iter() {
                match sender.try_send(Arc::clone(&envelope)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
            for id in &closed {
                subscribers.remove(id);
            }
        }

        if dropped > 0 {
            self.inner.dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(
                event = envelope.event.as_str(),
                dropped,
                "Discarded envelope for slow subscribers"
            );
        }
        if !closed.is_empty() {
            tracing::debug!(removed = closed.len(), "Removed disconnected subscribers");
        }

        delivered
    }

    /// Serialize `data` and broadcast it under `event`.
    ///
    /// Serialization failures are logged; fan-out must never fail a producer.
    pub fn publish<T: Serialize>(&self, event: EventKind, data: &T) -> usize {
        match Envelope::new(event, data) {
            Ok(envelope) => self.broadcast(envelope),
            Err(e) => {
                tracing::warn!(event = event.as_str(), error = %e, "Failed to serialize envelope");
                0
            }
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Total envelopes discarded because a subscriber's buffer was full
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

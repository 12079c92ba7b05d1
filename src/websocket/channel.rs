//! Topic Channels
//!
//! A channel is one named topic and the set of connections subscribed to it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::hub::{ConnectionId, Transport};

/// A topic with its live subscriber set
pub struct Channel {
    topic: String,
    subscribers: Mutex<HashSet<ConnectionId>>,
    transport: Arc<dyn Transport>,
}

impl Channel {
    pub fn new(topic: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            topic: topic.into(),
            subscribers: Mutex::new(HashSet::new()),
            transport,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Add a subscriber. Returns false if it was already subscribed.
    pub fn subscribe(&self, id: ConnectionId) -> bool {
        let added = self.lock().insert(id);
        if added {
            tracing::debug!(topic = %self.topic, connection_id = %id, "Subscribed");
        }
        added
    }

    /// Remove a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.lock().remove(&id);
        if removed {
            tracing::debug!(topic = %self.topic, connection_id = %id, "Unsubscribed");
        }
        removed
    }

    /// Send `data` to every subscriber.
    ///
    /// The subscriber set is locked for the whole fan-out, so no subscriber is
    /// added or removed mid-broadcast. A failed send is logged and skipped; the
    /// subscriber stays subscribed until its connection closes. Returns the
    /// number of successful sends.
    pub fn publish(&self, data: &[u8]) -> usize {
        let subscribers = self.lock();
        if subscribers.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for &id in subscribers.iter() {
            match self.transport.send(id, data) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        topic = %self.topic,
                        connection_id = %id,
                        error = %e,
                        "Failed to deliver message"
                    );
                }
            }
        }

        tracing::trace!(topic = %self.topic, subscribers = delivered, "Published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_subscribed(&self, id: ConnectionId) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ConnectionId>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

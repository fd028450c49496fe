//! Emitter Implementation
//!
//! The emitter is the notification primitive underneath every unit. It maps
//! a topic name to an ordered list of listeners.
//!
//! # How Emitting Works
//!
//! 1. `subscribe` appends a listener to the topic's list and returns its id.
//!
//! 2. `emit` snapshots the topic's list, releases the map, and then invokes
//!    each listener once, in subscription order.
//!
//! 3. `unsubscribe` removes the listener with the given id, if any.
//!
//! # Re-entrancy
//!
//! Because `emit` iterates over a snapshot, a listener may subscribe or
//! unsubscribe (itself or others) while being notified. Such changes apply
//! from the next `emit` on.

use std::fmt;

use dashmap::DashMap;
use smallvec::SmallVec;

use super::subscription::{Listener, SubscriptionId};

/// A keyed registry of listeners.
///
/// `P` is the payload type handed to every listener of every topic.
pub struct Emitter<P: ?Sized> {
    topics: DashMap<String, Vec<Listener<P>>>,
}

impl<P: ?Sized> Emitter<P> {
    /// Create an emitter with no topics.
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Register a callback on `topic`.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.add_listener(topic, Listener::new(callback))
    }

    /// Register an already constructed listener on `topic`.
    pub fn add_listener(&self, topic: &str, listener: Listener<P>) -> SubscriptionId {
        let id = listener.id();
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(listener);
        tracing::trace!(topic, %id, "listener added");
        id
    }

    /// Remove a listener from `topic`.
    ///
    /// Unknown ids and repeated calls are ignored.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let emptied = match self.topics.get_mut(topic) {
            Some(mut listeners) => {
                listeners.retain(|listener| listener.id() != id);
                listeners.is_empty()
            }
            None => false,
        };

        if emptied {
            self.topics.remove_if(topic, |_, listeners| listeners.is_empty());
        }
    }

    /// Notify every listener of `topic` with `payload`.
    ///
    /// Emitting on a topic without listeners does nothing.
    pub fn emit(&self, topic: &str, payload: &P) {
        let snapshot: SmallVec<[Listener<P>; 8]> = match self.topics.get(topic) {
            Some(listeners) => listeners.iter().cloned().collect(),
            None => return,
        };

        tracing::trace!(topic, listeners = snapshot.len(), "emit");
        for listener in &snapshot {
            listener.notify(payload);
        }
    }

    /// Number of listeners currently registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |listeners| listeners.len())
    }

    /// Whether `id` is currently registered on `topic`.
    pub fn contains(&self, topic: &str, id: SubscriptionId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|listeners| listeners.iter().any(|l| l.id() == id))
    }
}

impl<P: ?Sized> Default for Emitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> fmt::Debug for Emitter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("topics", &self.topics.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_notifies_in_subscription_order() {
        let emitter = Emitter::<i32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = log.clone();
            emitter.subscribe("topic", move |value| log.lock().push((tag, *value)));
        }

        emitter.emit("topic", &1);
        assert_eq!(*log.lock(), vec![("a", 1), ("b", 1), ("c", 1)]);
    }

    #[test]
    fn emit_only_reaches_its_topic() {
        let emitter = Emitter::<()>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        emitter.subscribe("left", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit("right", &());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        emitter.emit("left", &());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let emitter = Emitter::<()>::new();
        emitter.emit("nobody", &());
        assert_eq!(emitter.subscriber_count("nobody"), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let emitter = Emitter::<()>::new();
        let calls = Arc::new(AtomicI32::new(0));

        let first = {
            let calls = calls.clone();
            emitter.subscribe("topic", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let calls = calls.clone();
            emitter.subscribe("topic", move |_| {
                calls.fetch_add(10, Ordering::SeqCst);
            })
        };

        emitter.unsubscribe("topic", first);
        emitter.unsubscribe("topic", first);
        emitter.unsubscribe("missing", first);

        emitter.emit("topic", &());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(emitter.subscriber_count("topic"), 1);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_emit() {
        let emitter = Arc::new(Emitter::<()>::new());
        let calls = Arc::new(AtomicI32::new(0));
        let own_id = Arc::new(Mutex::new(None));

        let id = {
            let emitter_ref = Arc::downgrade(&emitter);
            let calls = calls.clone();
            let own_id = own_id.clone();
            emitter.subscribe("topic", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let (Some(emitter), Some(id)) = (emitter_ref.upgrade(), *own_id.lock()) {
                    emitter.unsubscribe("topic", id);
                }
            })
        };
        *own_id.lock() = Some(id);

        let later = Arc::new(AtomicI32::new(0));
        let later_clone = later.clone();
        emitter.subscribe("topic", move |_| {
            later_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit("topic", &());
        emitter.emit("topic", &());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(later.load(Ordering::SeqCst), 2);
        assert!(!emitter.contains("topic", id));
    }
}

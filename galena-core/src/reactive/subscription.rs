//! Subscription types for the notification primitive.
//!
//! A Listener is a callback registered on a topic. Every listener gets a
//! unique [`SubscriptionId`] when it is registered; the id is the only handle
//! a caller needs to remove it again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a subscription.
///
/// Ids come from a process-wide counter, so they are unique across every
/// emitter, unit and registry and are never reused. They are safe to use as
/// map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value of the id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A callback registered on a topic.
///
/// The callback is reference counted so that an emitter can snapshot its
/// listener list and release its lock before invoking anything.
pub struct Listener<P: ?Sized> {
    id: SubscriptionId,
    callback: Arc<dyn Fn(&P) + Send + Sync>,
}

impl<P: ?Sized> Listener<P> {
    /// Create a new listener with a fresh id.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(callback))
    }

    /// Create a listener around an already shared callback.
    pub fn from_arc(callback: Arc<dyn Fn(&P) + Send + Sync>) -> Self {
        Self {
            id: SubscriptionId::new(),
            callback,
        }
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Invoke the callback with the given payload.
    pub fn notify(&self, payload: &P) {
        (self.callback)(payload);
    }
}

impl<P: ?Sized> Clone for Listener<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<P: ?Sized> fmt::Debug for Listener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

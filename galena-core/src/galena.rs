//! Galena Registry
//!
//! The registry composes many named units ("slices") into one application
//! state and lets callers subscribe to all of them at once.
//!
//! # How It Works
//!
//! 1. `create_slice` builds a [`State`], wires in the registry's middleware,
//!    and stores it under its name.
//!
//! 2. `subscribe` registers the callback on every slice that exists and
//!    remembers both the callback and the per-slice subscription ids.
//!
//! 3. When a slice is created later, every live subscription is extended to
//!    it using the callback stored in step 2 (re-indexing). A subscriber
//!    never has to resubscribe to hear about new slices.
//!
//! 4. `unsubscribe` removes every per-slice subscription recorded for the id.
//!
//! # Thread Safety
//!
//! Registry tables sit behind `parking_lot` locks, always taken in the order
//! subscriptions, then slices. No registry lock is held while a subscriber
//! runs. Per-slice adapters only hold a weak reference to the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::{GalenaError, Result};
use crate::middleware::Middleware;
use crate::reactive::{IntoSettle, Listener, Snapshot, State, SubscriptionId};

type RegistryCallback<T> = Arc<dyn Fn(&Galena<T>) + Send + Sync>;

/// One cross-slice subscription.
struct Subscription<T> {
    /// The callback as the caller passed it.
    callback: RegistryCallback<T>,

    /// `(slice name, per-slice id)` for every slice it is attached to.
    entries: SmallVec<[(String, SubscriptionId); 4]>,
}

struct GalenaInner<T> {
    slices: RwLock<IndexMap<String, State<T>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware<T>>>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription<T>>>,
}

/// A registry of named state slices.
///
/// `Galena` is a handle: cloning it is cheap and every clone refers to the
/// same registry.
///
/// # Example
///
/// ```rust,ignore
/// let app = Galena::<Value>::new();
/// let counter = app.create_slice("counter", Value::record([("count", 0)]))?;
///
/// app.subscribe(|app| println!("slices changed: {:?}", app.slice_names()));
///
/// counter.update(|s| { s.get_mut("count").and_then(|c| c.increment(1)); }).await?;
/// ```
pub struct Galena<T> {
    inner: Arc<GalenaInner<T>>,
}

impl<T> Galena<T>
where
    T: Snapshot + Send + Sync + 'static,
{
    /// Create an empty registry without middleware.
    pub fn new() -> Self {
        Self::with_middleware(Vec::new())
    }

    /// Create an empty registry whose slices all receive `middleware`.
    pub fn with_middleware<I>(middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware<T>>>,
    {
        Self {
            inner: Arc::new(GalenaInner {
                slices: RwLock::new(IndexMap::new()),
                middleware: RwLock::new(middleware.into_iter().collect()),
                subscriptions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create and register a new slice.
    ///
    /// The slice receives every middleware the registry holds right now, and
    /// every live registry subscription is extended to it.
    ///
    /// # Errors
    ///
    /// Returns [`GalenaError::DuplicateSlice`] if `name` is taken. The
    /// existing slice and its subscriptions are left untouched.
    pub fn create_slice(&self, name: impl Into<String>, initial: T) -> Result<State<T>> {
        let name = name.into();
        let state = State::new(name.clone(), initial);
        state.register_middlewares(self.inner.middleware.read().iter().cloned());

        let mut subscriptions = self.inner.subscriptions.write();
        {
            let mut slices = self.inner.slices.write();
            if slices.contains_key(&name) {
                return Err(GalenaError::DuplicateSlice(name));
            }
            slices.insert(name.clone(), state.clone());
        }

        for subscription in subscriptions.values_mut() {
            let id = self.attach(&state, &subscription.callback);
            subscription.entries.push((name.clone(), id));
        }

        tracing::debug!(
            slice = %name,
            reindexed = subscriptions.len(),
            middleware = state.middleware_count(),
            "slice created"
        );
        Ok(state)
    }

    /// Look up a slice by name.
    pub fn get_slice(&self, name: &str) -> Result<State<T>> {
        self.inner
            .slices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GalenaError::UnknownSlice(name.to_string()))
    }

    /// Whether a slice with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.slices.read().contains_key(name)
    }

    /// Slice names, in creation order.
    pub fn slice_names(&self) -> Vec<String> {
        self.inner.slices.read().keys().cloned().collect()
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.inner.slices.read().len()
    }

    /// Whether the registry has no slices.
    pub fn is_empty(&self) -> bool {
        self.inner.slices.read().is_empty()
    }

    /// Every slice by name, in creation order.
    ///
    /// The map holds handles, so reading through it sees live values.
    pub fn state(&self) -> IndexMap<String, State<T>> {
        self.inner.slices.read().clone()
    }

    /// Subscribe to every slice, present and future.
    ///
    /// The callback receives the registry. The returned id covers all
    /// slices.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Galena<T>) + Send + Sync + 'static,
    {
        let callback: RegistryCallback<T> = Arc::new(callback);
        let id = SubscriptionId::new();

        let mut subscriptions = self.inner.subscriptions.write();
        let entries = self
            .inner
            .slices
            .read()
            .values()
            .map(|state| (state.name().to_string(), self.attach(state, &callback)))
            .collect::<SmallVec<_>>();

        tracing::debug!(%id, slices = entries.len(), "registry subscription added");
        subscriptions.insert(id, Subscription { callback, entries });
        id
    }

    /// Subscribe to a single slice.
    ///
    /// Remove the subscription with [`Galena::unsubscribe_from`] or on the
    /// slice itself.
    pub fn subscribe_to<F>(&self, name: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&State<T>) + Send + Sync + 'static,
    {
        Ok(self.get_slice(name)?.subscribe(callback))
    }

    /// Remove a registry subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let Some(subscription) = self.inner.subscriptions.write().remove(&id) else {
            return;
        };

        let slices = self.inner.slices.read();
        for (name, per_slice) in &subscription.entries {
            if let Some(state) = slices.get(name) {
                state.unsubscribe(*per_slice);
            }
        }
        tracing::debug!(%id, slices = subscription.entries.len(), "registry subscription removed");
    }

    /// Remove a single-slice subscription. Unknown names and ids are ignored.
    pub fn unsubscribe_from(&self, name: &str, id: SubscriptionId) {
        if let Some(state) = self.inner.slices.read().get(name) {
            state.unsubscribe(id);
        }
    }

    /// Number of live registry subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Add a middleware for slices created from now on.
    ///
    /// Slices that already exist are not retrofitted.
    pub fn register_middleware<M>(&self, middleware: M)
    where
        M: Middleware<T> + 'static,
    {
        self.inner.middleware.write().push(Arc::new(middleware));
    }

    /// Run a transition on the named slice.
    ///
    /// # Errors
    ///
    /// [`GalenaError::UnknownSlice`] if there is no such slice, otherwise
    /// whatever the transition returns.
    pub async fn update<F, R>(&self, name: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> R,
        R: IntoSettle<T>,
    {
        let state = self.get_slice(name)?;
        state.update(mutator).await
    }

    /// Reset the named slice to its initial value.
    pub async fn reset(&self, name: &str) -> Result<()> {
        self.get_slice(name)?.reset().await
    }

    /// Subscribe `callback` on one slice, adapted to receive the registry.
    fn attach(&self, state: &State<T>, callback: &RegistryCallback<T>) -> SubscriptionId {
        let registry: Weak<GalenaInner<T>> = Arc::downgrade(&self.inner);
        let callback = Arc::clone(callback);
        state.subscribe_listener(Listener::new(move |_: &State<T>| {
            if let Some(inner) = registry.upgrade() {
                callback(&Galena { inner });
            }
        }))
    }
}

impl<T> Default for Galena<T>
where
    T: Snapshot + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Galena<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Galena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Galena")
            .field("slices", &self.inner.slices.read().keys().collect::<Vec<_>>())
            .field("middleware", &self.inner.middleware.read().len())
            .field("subscriptions", &self.inner.subscriptions.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! State Implementation
//!
//! A State is one named unit of application data. It owns the current value
//! and a frozen snapshot of the value it was created with, and it is the only
//! thing allowed to change the current value.
//!
//! # How Transitions Work
//!
//! Every change goes through [`State::update`]:
//!
//! 1. The unit's transition lock is taken. Transitions on one unit run one at
//!    a time, in the order they were started.
//!
//! 2. Every middleware's `on_before_update` runs, in registration order. The
//!    value has not been touched yet.
//!
//! 3. The mutator runs against the current value. If it hands back pending
//!    work, the transition waits for it and then applies its patch.
//!
//! 4. Subscribers are notified exactly once, with the unit as payload.
//!
//! 5. Every middleware's `on_update` runs, in registration order.
//!
//! If the mutator fails, steps 4 and 5 are skipped and the error is returned
//! to the caller.
//!
//! # Thread Safety
//!
//! The value lives behind a `parking_lot::RwLock`. The lock is never held
//! while a hook or a subscriber runs, so both may read the unit freely. A
//! subscriber must not wait on a transition of the unit that notified it.
//!
//! The write lock *is* held while the mutator runs and while a pending patch
//! is applied. A mutator must only touch the `&mut T` it is given: reading
//! its own unit through any handle blocks the thread for good, and reading
//! another unit that is itself mid-transition can deadlock the pair.

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use tokio::sync::Mutex as TransitionLock;

use super::emitter::Emitter;
use super::mutation::{IntoSettle, Settle};
use super::snapshot::{Keyed, Snapshot};
use super::subscription::{Listener, SubscriptionId};
use crate::error::{GalenaError, Result};
use crate::middleware::{run_hooks, Middleware, Phase};

/// A named, subscribable unit of mutable state.
///
/// `State` is a handle: cloning it is cheap and every clone refers to the
/// same unit.
///
/// # Example
///
/// ```rust,ignore
/// let list = State::new("list", vec![1, 2, 3]);
///
/// list.subscribe(|state| println!("{:?}", *state.get_state()));
///
/// list.update(|items| items.push(4)).await?;
/// list.reset().await?;
/// ```
pub struct State<T> {
    inner: Arc<StateInner<T>>,
}

struct StateInner<T> {
    /// Unique name, also the notification topic.
    name: String,

    /// The live value.
    current: RwLock<T>,

    /// Snapshot taken at construction. Only read.
    initial: T,

    /// Registered middleware, append-only.
    middleware: RwLock<Vec<Arc<dyn Middleware<T>>>>,

    /// Notification primitive scoped to `name`.
    emitter: Emitter<State<T>>,

    /// Serializes transitions on this unit.
    transition: TransitionLock<()>,
}

impl<T> State<T> {
    /// The unit's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Read the current value.
    ///
    /// This is the live value, not a copy. Drop the guard before starting a
    /// transition on the same unit.
    ///
    /// # Deadlocks
    ///
    /// Never call this from inside a mutator of the same unit; the mutator
    /// runs under the write lock. Hooks and subscribers may call it.
    pub fn get_state(&self) -> RwLockReadGuard<'_, T> {
        self.inner.current.read()
    }

    /// Read the value the unit was created with.
    pub fn initial_state(&self) -> &T {
        &self.inner.initial
    }

    /// Number of registered middleware.
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.read().len()
    }

    /// Number of direct subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.emitter.subscriber_count(&self.inner.name)
    }

    /// Whether two handles refer to the same unit.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> State<T>
where
    T: Keyed,
{
    /// Read one field of the current value.
    ///
    /// # Deadlocks
    ///
    /// Same rule as [`State::get_state`]: not from inside a mutator of this
    /// unit.
    pub fn get(&self, key: &T::Key) -> Option<MappedRwLockReadGuard<'_, T::Field>> {
        RwLockReadGuard::try_map(self.inner.current.read(), |current| current.field(key)).ok()
    }

    /// Read one field of the initial value.
    pub fn default(&self, key: &T::Key) -> Option<&T::Field> {
        self.inner.initial.field(key)
    }
}

impl<T> State<T>
where
    T: Snapshot + Send + Sync + 'static,
{
    /// Create a new unit.
    ///
    /// The initial value is stored as given; the live value starts as a
    /// snapshot of it, so the two never share top-level storage.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let current = initial.snapshot();
        Self {
            inner: Arc::new(StateInner {
                name: name.into(),
                current: RwLock::new(current),
                initial,
                middleware: RwLock::new(Vec::new()),
                emitter: Emitter::new(),
                transition: TransitionLock::new(()),
            }),
        }
    }

    /// Run a transition.
    ///
    /// The mutator receives the current value. It may change it in place and
    /// return `()`, return a `Result` to report failure, or return a pending
    /// [`Settle`] whose patch is applied once its future resolves.
    ///
    /// # Errors
    ///
    /// Returns [`GalenaError::Mutation`] if the mutator fails. Nothing is
    /// emitted and no `on_update` hook runs in that case. Changes the mutator
    /// made synchronously before failing are kept.
    ///
    /// # Deadlocks
    ///
    /// The mutator runs while the unit's write lock is held. It must only use
    /// the `&mut T` it receives and must not read any unit through a handle
    /// (`get`, `get_state`, or a registry slice). Read what it needs before
    /// calling `update`, or use [`State::update_with`].
    pub async fn update<F, R>(&self, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> R,
        R: IntoSettle<T>,
    {
        let _transition = self.inner.transition.lock().await;
        let middleware = self.middleware_snapshot();

        run_hooks(self, &middleware, Phase::BeforeUpdate);

        let settle = {
            let mut current = self.inner.current.write();
            mutator(&mut *current).into_settle()
        };

        let outcome = match settle {
            Settle::Ready(result) => result,
            Settle::Pending(pending) => match pending.await {
                Ok(patch) => {
                    let mut current = self.inner.current.write();
                    patch(&mut *current);
                    Ok(())
                }
                Err(error) => Err(error),
            },
        };

        if let Err(source) = outcome {
            tracing::debug!(unit = %self.inner.name, error = %source, "transition failed");
            return Err(GalenaError::Mutation {
                unit: self.inner.name.clone(),
                source,
            });
        }

        self.inner.emitter.emit(&self.inner.name, self);
        run_hooks(self, &middleware, Phase::Update);

        Ok(())
    }

    /// Restore the value the unit was created with.
    ///
    /// Runs as a regular transition, so middleware and subscribers see it.
    /// The restored value is a fresh snapshot, never the stored initial
    /// value itself.
    pub async fn reset(&self) -> Result<()> {
        let fresh = self.inner.initial.snapshot();
        self.update(move |current| {
            *current = fresh;
        })
        .await
    }

    /// Wrap a mutator that takes an argument into a reusable mutation.
    ///
    /// ```rust,ignore
    /// let add = list.mutation(|items: &mut Vec<u32>, item: u32| items.push(item));
    /// add(4).await?;
    /// add(5).await?;
    /// ```
    pub fn mutation<A, F, R>(&self, func: F) -> impl Fn(A) -> BoxFuture<'static, Result<()>>
    where
        A: Send + 'static,
        F: Fn(&mut T, A) -> R + Send + Sync + 'static,
        R: IntoSettle<T> + 'static,
    {
        let state = self.clone();
        let func = Arc::new(func);
        move |argument: A| {
            let state = state.clone();
            let func = Arc::clone(&func);
            async move { state.update(move |current| func(current, argument)).await }.boxed()
        }
    }

    /// Append a middleware.
    ///
    /// Takes effect from the next transition; a transition already running
    /// keeps the list it started with.
    pub fn register_middleware<M>(&self, middleware: M)
    where
        M: Middleware<T> + 'static,
    {
        self.register_shared_middleware(Arc::new(middleware));
    }

    /// Append a middleware that is already shared.
    pub fn register_shared_middleware(&self, middleware: Arc<dyn Middleware<T>>) {
        self.inner.middleware.write().push(middleware);
    }

    /// Append several shared middleware, keeping their order.
    pub fn register_middlewares<I>(&self, middleware: I)
    where
        I: IntoIterator<Item = Arc<dyn Middleware<T>>>,
    {
        self.inner.middleware.write().extend(middleware);
    }

    /// Register a callback invoked after every successful transition.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&State<T>) + Send + Sync + 'static,
    {
        self.inner.emitter.subscribe(&self.inner.name, callback)
    }

    /// Register a shared callback. Used by the registry to fan one callback
    /// out across slices.
    pub(crate) fn subscribe_listener(&self, listener: Listener<State<T>>) -> SubscriptionId {
        self.inner.emitter.add_listener(&self.inner.name, listener)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.emitter.unsubscribe(&self.inner.name, id);
    }

    /// Wait for a future and then run a transition with its output.
    ///
    /// Unlike a pending [`Settle`], the future runs before any hook fires,
    /// so the transition lock is held only for the in-place change.
    pub async fn update_with<Fut, F>(&self, future: Fut, mutator: F) -> Result<()>
    where
        Fut: Future,
        F: FnOnce(&mut T, Fut::Output),
    {
        let output = future.await;
        self.update(move |current| mutator(current, output)).await
    }

    fn middleware_snapshot(&self) -> Vec<Arc<dyn Middleware<T>>> {
        self.inner.middleware.read().clone()
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for State<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.inner.name)
            .field("current", &*self.inner.current.read())
            .field("subscriber_count", &self.subscriber_count())
            .field("middleware_count", &self.middleware_count())
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
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<Vec<i32>> for Recorder {
        fn on_before_update(&self, state: &State<Vec<i32>>) {
            let len = state.get_state().len();
            self.log.lock().push(format!("{}.before:{}", self.tag, len));
        }

        fn on_update(&self, state: &State<Vec<i32>>) {
            let len = state.get_state().len();
            self.log.lock().push(format!("{}.after:{}", self.tag, len));
        }
    }

    fn counter() -> State<HashMap<String, i32>> {
        let mut initial = HashMap::new();
        initial.insert("count".to_string(), 0);
        State::new("counter", initial)
    }

    #[tokio::test]
    async fn update_notifies_once_per_call() {
        let state = counter();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        state
            .update(|s| *s.entry("count".into()).or_default() += 1)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state
            .update(|s| *s.entry("count".into()).or_default() += 1)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.get(&"count".to_string()).map(|v| *v), Some(2));
    }

    #[tokio::test]
    async fn subscriber_sees_updated_unit() {
        let state = counter();
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        state.subscribe(move |unit| {
            let count = unit.get(&"count".to_string()).map_or(-1, |v| *v);
            seen_clone.store(count, Ordering::SeqCst);
        });

        state.update(|s| {
            s.insert("count".into(), 41);
        })
        .await
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 41);
    }

    #[tokio::test]
    async fn reset_restores_a_fresh_copy() {
        let state = State::new("list", vec![1, 2, 3]);

        state.update(|items| items.push(4)).await.unwrap();
        assert_eq!(state.get_state().len(), 4);

        state.reset().await.unwrap();
        assert_eq!(*state.get_state(), vec![1, 2, 3]);
        assert_ne!(state.get_state().as_ptr(), state.initial_state().as_ptr());

        state.update(|items| items.clear()).await.unwrap();
        assert_eq!(*state.initial_state(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn default_reads_initial_value() {
        let state = counter();
        state
            .update(|s| {
                s.insert("count".into(), 9);
            })
            .await
            .unwrap();

        let key = "count".to_string();
        assert_eq!(state.default(&key), Some(&0));
        assert_eq!(state.get(&key).map(|v| *v), Some(9));
        assert!(state.get(&"missing".to_string()).is_none());
    }

    #[tokio::test]
    async fn hooks_wrap_the_notification() {
        let state = State::new("list", vec![1]);
        let log = Arc::new(Mutex::new(Vec::new()));

        state.register_middleware(Recorder { tag: "m1", log: log.clone() });
        state.register_middleware(Recorder { tag: "m2", log: log.clone() });

        let log_clone = log.clone();
        state.subscribe(move |unit| {
            let len = unit.get_state().len();
            log_clone.lock().push(format!("notify:{len}"));
        });

        state.update(|items| items.push(2)).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["m1.before:1", "m2.before:1", "notify:2", "m1.after:2", "m2.after:2"]
        );
    }

    #[tokio::test]
    async fn failed_mutation_skips_notification_and_after_hook() {
        let state = State::new("list", vec![1]);
        let log = Arc::new(Mutex::new(Vec::new()));
        state.register_middleware(Recorder { tag: "m", log: log.clone() });

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let result = state.update(|_| Err::<(), _>("rejected")).await;

        assert!(matches!(result, Err(GalenaError::Mutation { ref unit, .. }) if unit == "list"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock(), vec!["m.before:1"]);
    }

    #[tokio::test]
    async fn pending_mutation_applies_after_settling() {
        let state = State::new("list", vec![1, 2, 3]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        state.subscribe(move |unit| {
            *seen_clone.lock() = unit.get_state().clone();
        });

        state
            .update(|_| {
                Settle::after(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    |items: &mut Vec<i32>| items.push(4)
                })
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failed_pending_mutation_propagates() {
        let state = State::new("list", vec![1]);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let result = state
            .update(|_| Settle::try_after(async { Err::<fn(&mut Vec<i32>), _>("timeout") }))
            .await;

        let message = result.err().map(|e| e.to_string());
        assert_eq!(message.as_deref(), Some("mutation of `list` failed: timeout"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*state.get_state(), vec![1]);
    }

    #[tokio::test]
    async fn transitions_on_one_unit_do_not_interleave() {
        let state = State::new("list", Vec::<i32>::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        state.register_middleware(Recorder { tag: "m", log: log.clone() });

        let slow = state.update(|_| {
            Settle::after(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                |items: &mut Vec<i32>| items.push(1)
            })
        });
        let fast = state.update(|items| items.push(2));

        let (a, b) = tokio::join!(slow, fast);
        a.unwrap();
        b.unwrap();

        assert_eq!(*state.get_state(), vec![1, 2]);
        assert_eq!(
            *log.lock(),
            vec!["m.before:0", "m.after:1", "m.before:1", "m.after:2"]
        );
    }

    struct Exploding;

    impl Middleware<Vec<i32>> for Exploding {
        fn on_before_update(&self, _state: &State<Vec<i32>>) {
            panic!("before hook failed");
        }

        fn on_update(&self, _state: &State<Vec<i32>>) {
            panic!("after hook failed");
        }
    }

    #[tokio::test]
    async fn panicking_hook_does_not_stop_the_transition() {
        let state = State::new("list", vec![1]);
        let log = Arc::new(Mutex::new(Vec::new()));
        state.register_middleware(Exploding);
        state.register_middleware(Recorder { tag: "m", log: log.clone() });

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.update(|items| items.push(2)).await.unwrap();

        assert_eq!(*state.get_state(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), vec!["m.before:1", "m.after:2"]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let state = State::new("n", 0_i32);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let id = state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        state.update(|n| *n += 1).await.unwrap();

        state.unsubscribe(id);
        state.unsubscribe(id);
        state.update(|n| *n += 1).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn mutation_wrapper_forwards_arguments() {
        let state = State::new("list", vec![1]);
        let push = state.mutation(|items: &mut Vec<i32>, item: i32| items.push(item));

        push(2).await.unwrap();
        push(3).await.unwrap();

        assert_eq!(*state.get_state(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn update_with_waits_before_hooks() {
        let state = State::new("list", vec![1]);
        let log = Arc::new(Mutex::new(Vec::new()));
        state.register_middleware(Recorder { tag: "m", log: log.clone() });

        state
            .update_with(async { 7 }, |items, value| items.push(value))
            .await
            .unwrap();

        assert_eq!(*state.get_state(), vec![1, 7]);
        assert_eq!(*log.lock(), vec!["m.before:1", "m.after:2"]);
    }

    #[test]
    fn clones_share_the_unit() {
        let state = State::new("n", 0_i32);
        let clone = state.clone();
        assert!(state.ptr_eq(&clone));
        assert_eq!(clone.name(), "n");
    }
}

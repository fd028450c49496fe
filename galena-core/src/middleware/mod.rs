//! Middleware
//!
//! Middleware observe every state transition of the units they are
//! registered on. Each transition calls two hooks:
//!
//! - `on_before_update` before the mutator touches the value, so the
//!   pre-mutation state is still visible;
//! - `on_update` after subscribers have been notified of the new value.
//!
//! Both hooks have no-op defaults; a middleware overrides the ones it needs.
//!
//! # Statefulness
//!
//! Middleware commonly keep something between the two hooks of one
//! transition (a snapshot, a timestamp). A unit never interleaves the hook
//! pairs of two of its transitions, but one middleware instance may be
//! shared by many units, so shipped middleware key their bookkeeping by unit
//! name.
//!
//! # Isolation
//!
//! A panicking hook is caught and logged. The remaining hooks of the same
//! phase still run, and the transition itself proceeds.

mod logger;
mod profiler;

pub use logger::Logger;
pub use profiler::{Profiler, ProfilerConfig};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::reactive::State;

/// Lifecycle hooks invoked around every state transition.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use galena_core::{Middleware, State};
///
/// #[derive(Default)]
/// struct CountTransitions(AtomicUsize);
///
/// impl<T> Middleware<T> for CountTransitions {
///     fn on_update(&self, _state: &State<T>) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Middleware<T>: Send + Sync {
    /// Called each time a transition is about to be applied.
    fn on_before_update(&self, _state: &State<T>) {}

    /// Called each time a transition has been applied and announced.
    fn on_update(&self, _state: &State<T>) {}
}

impl<T, M> Middleware<T> for Arc<M>
where
    M: Middleware<T> + ?Sized,
{
    fn on_before_update(&self, state: &State<T>) {
        (**self).on_before_update(state);
    }

    fn on_update(&self, state: &State<T>) {
        (**self).on_update(state);
    }
}

/// The two hook phases of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    BeforeUpdate,
    Update,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::BeforeUpdate => f.write_str("on_before_update"),
            Phase::Update => f.write_str("on_update"),
        }
    }
}

/// Run one phase of hooks, in order, isolating each invocation.
pub(crate) fn run_hooks<T>(state: &State<T>, middleware: &[Arc<dyn Middleware<T>>], phase: Phase) {
    for (index, mw) in middleware.iter().enumerate() {
        let outcome = catch_unwind(AssertUnwindSafe(|| match phase {
            Phase::BeforeUpdate => mw.on_before_update(state),
            Phase::Update => mw.on_update(state),
        }));

        if let Err(panic) = outcome {
            tracing::error!(
                unit = state.name(),
                middleware = index,
                hook = %phase,
                reason = panic_message(&*panic),
                "middleware hook panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<i32> for Recorder {
        fn on_before_update(&self, _state: &State<i32>) {
            self.log.lock().push(format!("{}.before", self.tag));
        }

        fn on_update(&self, _state: &State<i32>) {
            self.log.lock().push(format!("{}.after", self.tag));
        }
    }

    struct Exploding;

    impl Middleware<i32> for Exploding {
        fn on_before_update(&self, _state: &State<i32>) {
            panic!("exploding middleware");
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let state = State::new("n", 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let middleware: Vec<Arc<dyn Middleware<i32>>> = vec![
            Arc::new(Recorder { tag: "m1", log: log.clone() }),
            Arc::new(Recorder { tag: "m2", log: log.clone() }),
        ];

        run_hooks(&state, &middleware, Phase::BeforeUpdate);
        run_hooks(&state, &middleware, Phase::Update);

        assert_eq!(*log.lock(), vec!["m1.before", "m2.before", "m1.after", "m2.after"]);
    }

    #[test]
    fn panicking_hook_does_not_stop_siblings() {
        let state = State::new("n", 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let middleware: Vec<Arc<dyn Middleware<i32>>> = vec![
            Arc::new(Exploding),
            Arc::new(Recorder { tag: "m2", log: log.clone() }),
        ];

        run_hooks(&state, &middleware, Phase::BeforeUpdate);

        assert_eq!(*log.lock(), vec!["m2.before"]);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Silent;
        impl Middleware<i32> for Silent {}

        let state = State::new("n", 0);
        let middleware: Vec<Arc<dyn Middleware<i32>>> = vec![Arc::new(Silent)];
        run_hooks(&state, &middleware, Phase::BeforeUpdate);
        run_hooks(&state, &middleware, Phase::Update);
    }

    #[test]
    fn panic_message_reads_both_string_kinds() {
        let literal: Box<dyn std::any::Any + Send> = Box::new("literal");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(&*literal), "literal");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "<non-string panic>");
    }
}

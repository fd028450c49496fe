//! Transition logger.
//!
//! Logs every transition at `info` level through `tracing`: the unit's name,
//! the local wall-clock time, and the value before and after the change.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use parking_lot::Mutex;

use super::Middleware;
use crate::reactive::State;

/// Middleware that logs the previous and next value of every transition.
///
/// The previous value is rendered with `Debug` in `on_before_update` and
/// held, per unit, until the matching `on_update`.
#[derive(Debug, Default)]
pub struct Logger {
    previous: Mutex<HashMap<String, String>>,
    logged: AtomicUsize,
}

impl Logger {
    /// Create a logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transitions logged so far.
    pub fn logged(&self) -> usize {
        self.logged.load(Ordering::Relaxed)
    }

    /// Number of transitions whose `on_update` has not run yet.
    pub fn in_flight(&self) -> usize {
        self.previous.lock().len()
    }
}

impl<T> Middleware<T> for Logger
where
    T: Debug,
{
    fn on_before_update(&self, state: &State<T>) {
        let rendered = format!("{:?}", *state.get_state());
        self.previous.lock().insert(state.name().to_string(), rendered);
    }

    fn on_update(&self, state: &State<T>) {
        let previous = self.previous.lock().remove(state.name());
        let next = format!("{:?}", *state.get_state());

        tracing::info!(
            unit = state.name(),
            at = %Local::now().format(CLOCK_FORMAT),
            previous = previous.as_deref().unwrap_or("<unknown>"),
            next = %next,
            "Mutation"
        );
        self.logged.fetch_add(1, Ordering::Relaxed);
    }
}

/// Time of day with millisecond precision.
const CLOCK_FORMAT: &str = "%H:%M:%S%.3f";

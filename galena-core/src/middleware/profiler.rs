//! Transition profiler.
//!
//! Times each transition from `on_before_update` to `on_update` and warns
//! when one takes longer than a threshold. The default threshold of 16 ms is
//! one frame at 60 Hz.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

use super::Middleware;
use crate::reactive::State;

/// Settings for a [`Profiler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Transitions slower than this many milliseconds are reported.
    pub threshold_ms: u64,
}

impl ProfilerConfig {
    /// Default threshold in milliseconds.
    pub const DEFAULT_THRESHOLD_MS: u64 = 16;

    /// The threshold as a `Duration`.
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            threshold_ms: Self::DEFAULT_THRESHOLD_MS,
        }
    }
}

/// Middleware that reports slow transitions.
#[derive(Debug)]
pub struct Profiler {
    threshold: Duration,
    started: Mutex<HashMap<String, Instant>>,
    slow: AtomicUsize,
    last: Mutex<Option<Duration>>,
}

impl Profiler {
    /// Create a profiler with the given threshold.
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            started: Mutex::new(HashMap::new()),
            slow: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// Create a profiler from its settings.
    pub fn from_config(config: ProfilerConfig) -> Self {
        Self::new(config.threshold())
    }

    /// The reporting threshold.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Number of transitions that exceeded the threshold.
    pub fn slow_transitions(&self) -> usize {
        self.slow.load(Ordering::Relaxed)
    }

    /// Duration of the most recently completed transition.
    pub fn last_duration(&self) -> Option<Duration> {
        *self.last.lock()
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::from_config(ProfilerConfig::default())
    }
}

impl<T> Middleware<T> for Profiler {
    fn on_before_update(&self, state: &State<T>) {
        self.started
            .lock()
            .insert(state.name().to_string(), Instant::now());
    }

    fn on_update(&self, state: &State<T>) {
        let Some(started) = self.started.lock().remove(state.name()) else {
            return;
        };

        let elapsed = started.elapsed();
        *self.last.lock() = Some(elapsed);

        if elapsed > self.threshold {
            self.slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                unit = state.name(),
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                threshold_ms = self.threshold.as_millis() as u64,
                "Slow state transition detected"
            );
        }
    }
}

//! Reference clocks: the single source of time for an engine instance.
//!
//! The engine only ever reads a clock. Readings are seconds on a monotonic,
//! non-decreasing timeline; the origin is up to the implementation.

use crate::common::Seconds;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// A monotonic source of elapsed seconds.
pub trait ReferenceClock: Send + Sync {
    fn now(&self) -> Seconds;
}

/// Seconds elapsed since the clock was created.
///
/// Backed by `tokio::time::Instant`, so it follows tokio's paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceClock for MonotonicClock {
    fn now(&self) -> Seconds {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same reading.
///
/// Useful for offline rendering and deterministic tests. Requests to move the
/// clock backwards are ignored.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Seconds>>,
}

impl ManualClock {
    pub fn new(start: Seconds) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, t: Seconds) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if t > *now {
            *now = t;
        }
    }

    pub fn advance(&self, dt: Seconds) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if dt > 0.0 {
            *now += dt;
        }
    }
}

impl ReferenceClock for ManualClock {
    fn now(&self) -> Seconds {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

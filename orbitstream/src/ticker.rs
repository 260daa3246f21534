//! Cadence ticker: a monotonic stopwatch with conditional reset.
//!
//! The coordinator gates its per-entity work on a [`CadenceTicker`] so that
//! samples are consumed at a fixed world rate, independent of how often the
//! simulation loop calls it.
//!
//! # Example
//!
//! ```
//! use orbitstream::ticker::{CadenceTicker, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let mut ticker = CadenceTicker::with_clock(clock.clone());
//!
//! clock.advance(Duration::from_millis(400));
//! assert!(!ticker.try_lap(1.0));
//!
//! clock.advance(Duration::from_millis(700));
//! assert!(ticker.try_lap(1.0));
//! assert_eq!(ticker.peek(), 0.0);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonic instants.
pub trait Clock: Send + Sync {
    /// Current instant. Must never go backwards.
    fn now(&self) -> Instant;
}

/// Production clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
///
/// Clones share the same underlying instant, so a test can hold one clone
/// and hand another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Move the clock forward by fractional seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Monotonic stopwatch with a resettable lap reference.
#[derive(Debug)]
pub struct CadenceTicker<C: Clock = MonotonicClock> {
    clock: C,
    created: Instant,
    lap_start: Instant,
}

impl Default for CadenceTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl CadenceTicker {
    /// Create a ticker on the system monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl<C: Clock> CadenceTicker<C> {
    /// Create a ticker on the given clock. Both reference points start now.
    pub fn with_clock(clock: C) -> Self {
        let now = clock.now();
        Self {
            clock,
            created: now,
            lap_start: now,
        }
    }

    /// Reset the lap reference and return seconds elapsed since the previous reset.
    pub fn lap(&mut self) -> f64 {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.lap_start);
        self.lap_start = now;
        elapsed.as_secs_f64()
    }

    /// Seconds elapsed since the last reset, without resetting.
    pub fn peek(&self) -> f64 {
        self.clock
            .now()
            .saturating_duration_since(self.lap_start)
            .as_secs_f64()
    }

    /// Seconds elapsed since construction. Never reset.
    pub fn elapsed_total(&self) -> f64 {
        self.clock
            .now()
            .saturating_duration_since(self.created)
            .as_secs_f64()
    }

    /// Reset and return `true` if at least `threshold` seconds have elapsed.
    ///
    /// Otherwise returns `false` and leaves the lap reference untouched.
    pub fn try_lap(&mut self, threshold: f64) -> bool {
        let now = self.clock.now();
        if now.saturating_duration_since(self.lap_start).as_secs_f64() >= threshold {
            self.lap_start = now;
            true
        } else {
            false
        }
    }
}

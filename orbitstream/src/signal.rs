//! Pending request counter: backlog count, wake signal, and shutdown flag.
//!
//! One counter carries three meanings:
//!
//! ```text
//!   value > 0   entities awaiting a fetch; the worker should scan
//!   value == 0  idle; the worker sleeps on the wake channel
//!   value == -1 stop sentinel; the worker exits at its next check
//! ```
//!
//! Waking goes through a capacity-1 channel. The consumer side only ever
//! calls `try_send`, so signalling never blocks the real-time thread; a full
//! buffer means a wake token is already waiting, which is all the worker
//! needs. Because the token is buffered, an increment that lands between the
//! worker's "counter is zero" check and its `blocking_recv` is never lost.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Reserved counter value signalling shutdown.
pub const STOP_SENTINEL: i64 = -1;

/// What the worker observed when it woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// At least one entity is awaiting a fetch.
    Work(i64),
    /// The stop sentinel is set.
    Stop,
}

/// Process-wide count of entities awaiting fetch.
#[derive(Debug)]
pub struct PendingRequestCounter {
    value: AtomicI64,
    wake_tx: mpsc::Sender<()>,
    wake_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Default for PendingRequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestCounter {
    /// Create an idle counter.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        Self {
            value: AtomicI64::new(0),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
        }
    }

    /// Current value. Advisory; may be stale by the time it is read.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Whether the stop sentinel has been set.
    pub fn is_stopped(&self) -> bool {
        self.value() == STOP_SENTINEL
    }

    /// Increment and wake the worker.
    ///
    /// Returns `false` without touching the counter once stopped.
    pub fn increment(&self) -> bool {
        let bumped = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v >= 0).then_some(v + 1)
            })
            .is_ok();
        if bumped {
            self.wake();
        }
        bumped
    }

    /// Decrement after a request has been dispatched or skipped.
    ///
    /// Never goes below zero and never overwrites the sentinel.
    pub fn decrement(&self) -> bool {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v > 0).then_some(v - 1)
            })
            .is_ok()
    }

    /// Set the stop sentinel and wake the worker.
    ///
    /// Returns `true` only for the call that actually set it.
    pub fn stop(&self) -> bool {
        let previous = self.value.swap(STOP_SENTINEL, Ordering::AcqRel);
        self.wake();
        previous != STOP_SENTINEL
    }

    /// Block the calling thread until there is work or the sentinel is set.
    ///
    /// Worker-side only; the receiver must have been claimed with
    /// [`take_receiver`](Self::take_receiver). Must not be called from
    /// inside an async runtime.
    pub fn wait(&self, wake_rx: &mut mpsc::Receiver<()>) -> Wake {
        loop {
            match self.value() {
                STOP_SENTINEL => return Wake::Stop,
                v if v > 0 => return Wake::Work(v),
                _ => {}
            }
            if wake_rx.blocking_recv().is_none() {
                // Sender lives in `self`, so this only happens mid-teardown.
                return Wake::Stop;
            }
        }
    }

    /// Claim the wake receiver. Succeeds once per counter.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<()>> {
        self.wake_rx.lock().take()
    }

    fn wake(&self) {
        // Full means a token is already pending; the worker re-reads the
        // counter after every token, so one is enough.
        let _ = self.wake_tx.try_send(());
    }
}

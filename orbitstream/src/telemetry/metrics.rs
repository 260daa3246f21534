//! Atomic refresh counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::TelemetrySnapshot;
use crate::fetch::FetchOutcome;

/// Counters shared by the worker and the coordinator.
#[derive(Debug)]
pub struct RefreshMetrics {
    started: Instant,

    // Worker side
    wake_cycles: AtomicU64,
    fetches_ok: AtomicU64,
    fetches_rejected: AtomicU64,
    fetches_retried: AtomicU64,
    fetches_held: AtomicU64,
    fetch_panics: AtomicU64,
    held_skips: AtomicU64,
    samples_appended: AtomicU64,

    // Consumer side
    cadence_ticks: AtomicU64,
    samples_applied: AtomicU64,
    refills_requested: AtomicU64,
    contended_skips: AtomicU64,

    // Operator hold/resume; fetcher holds count under `fetches_held`
    holds: AtomicU64,
    resumes: AtomicU64,
}

impl Default for RefreshMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            wake_cycles: AtomicU64::new(0),
            fetches_ok: AtomicU64::new(0),
            fetches_rejected: AtomicU64::new(0),
            fetches_retried: AtomicU64::new(0),
            fetches_held: AtomicU64::new(0),
            fetch_panics: AtomicU64::new(0),
            held_skips: AtomicU64::new(0),
            samples_appended: AtomicU64::new(0),
            cadence_ticks: AtomicU64::new(0),
            samples_applied: AtomicU64::new(0),
            refills_requested: AtomicU64::new(0),
            contended_skips: AtomicU64::new(0),
            holds: AtomicU64::new(0),
            resumes: AtomicU64::new(0),
        }
    }

    // ---- worker ----

    pub fn wake_cycle(&self) {
        self.wake_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one fetch and how many samples it appended.
    pub fn fetch_completed(&self, outcome: FetchOutcome, appended: usize) {
        let counter = match outcome {
            FetchOutcome::Ok => &self.fetches_ok,
            FetchOutcome::Reject => &self.fetches_rejected,
            FetchOutcome::Retry => &self.fetches_retried,
            FetchOutcome::Hold => &self.fetches_held,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.samples_appended
            .fetch_add(appended as u64, Ordering::Relaxed);
    }

    pub fn fetch_panicked(&self) {
        self.fetch_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn held_skip(&self) {
        self.held_skips.fetch_add(1, Ordering::Relaxed);
    }

    // ---- consumer ----

    pub fn cadence_tick(&self) {
        self.cadence_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_applied(&self) {
        self.samples_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refill_requested(&self) {
        self.refills_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contended_skip(&self) {
        self.contended_skips.fetch_add(1, Ordering::Relaxed);
    }

    // ---- admin ----

    /// Operator hold via `RefreshPipeline::hold`.
    pub fn hold(&self) {
        self.holds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started.elapsed(),
            wake_cycles: self.wake_cycles.load(Ordering::Relaxed),
            fetches_ok: self.fetches_ok.load(Ordering::Relaxed),
            fetches_rejected: self.fetches_rejected.load(Ordering::Relaxed),
            fetches_retried: self.fetches_retried.load(Ordering::Relaxed),
            fetches_held: self.fetches_held.load(Ordering::Relaxed),
            fetch_panics: self.fetch_panics.load(Ordering::Relaxed),
            held_skips: self.held_skips.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            cadence_ticks: self.cadence_ticks.load(Ordering::Relaxed),
            samples_applied: self.samples_applied.load(Ordering::Relaxed),
            refills_requested: self.refills_requested.load(Ordering::Relaxed),
            contended_skips: self.contended_skips.load(Ordering::Relaxed),
            holds: self.holds.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
        }
    }
}

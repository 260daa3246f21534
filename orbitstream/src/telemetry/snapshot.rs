//! Point-in-time copy of refresh counters.

use std::time::Duration;

/// Snapshot of [`RefreshMetrics`](super::RefreshMetrics).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub wake_cycles: u64,
    pub fetches_ok: u64,
    pub fetches_rejected: u64,
    pub fetches_retried: u64,
    pub fetches_held: u64,
    pub fetch_panics: u64,
    pub held_skips: u64,
    pub samples_appended: u64,
    pub cadence_ticks: u64,
    pub samples_applied: u64,
    pub refills_requested: u64,
    pub contended_skips: u64,
    /// Operator holds only; fetcher holds are in `fetches_held`.
    pub holds: u64,
    pub resumes: u64,
}

impl TelemetrySnapshot {
    /// Fetcher invocations of any outcome (panics excluded).
    pub fn total_fetches(&self) -> u64 {
        self.fetches_ok + self.fetches_rejected + self.fetches_retried + self.fetches_held
    }

    /// Fraction of fetches that returned `Ok`, or 1.0 before the first fetch.
    pub fn fetch_success_rate(&self) -> f64 {
        let total = self.total_fetches();
        if total == 0 {
            return 1.0;
        }
        self.fetches_ok as f64 / total as f64
    }

    /// Uptime as `HH:MM:SS`.
    pub fn uptime_human(&self) -> String {
        let secs = self.uptime.as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

//! Refresh telemetry for observability and end-of-run summaries.
//!
//! Lock-free atomic counters are bumped by the worker and the coordinator;
//! views take a point-in-time [`TelemetrySnapshot`].
//!
//! ```text
//! FetchWorker ───────┐
//!                    ├──► RefreshMetrics ───► TelemetrySnapshot ───► CLI summary
//! RefreshCoordinator ┘    (atomic counters)   (plain copy)
//! ```
//!
//! # Example
//!
//! ```
//! use orbitstream::fetch::FetchOutcome;
//! use orbitstream::telemetry::RefreshMetrics;
//!
//! let metrics = RefreshMetrics::new();
//! metrics.fetch_completed(FetchOutcome::Ok, 60);
//! metrics.sample_applied();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.fetches_ok, 1);
//! assert_eq!(snapshot.samples_appended, 60);
//! ```

mod metrics;
mod snapshot;

pub use metrics::RefreshMetrics;
pub use snapshot::TelemetrySnapshot;

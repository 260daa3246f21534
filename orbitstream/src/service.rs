//! One-call bootstrap for the refresh pipeline.
//!
//! [`RefreshService`] owns the shared pipeline, the coordinator, and the
//! worker handle, and tears them down in the only safe order:
//! 1. Stop the worker (sentinel + wake)
//! 2. Join the worker thread
//! 3. Release the pipeline
//!
//! # Example
//!
//! ```no_run
//! use orbitstream::config::PipelineConfig;
//! use orbitstream::fetch::SyntheticOrbitFetcher;
//! use orbitstream::service::RefreshService;
//!
//! let config = PipelineConfig::default();
//! let fetcher = SyntheticOrbitFetcher::new(config.synthetic.clone());
//! let mut service = RefreshService::start(&config, fetcher)?;
//!
//! // Once per simulation frame:
//! if let Some(report) = service.coordinator_mut().refresh() {
//!     for (id, position) in report.advanced() {
//!         println!("{id}: {position:?}");
//!     }
//! }
//!
//! let summary = service.shutdown()?;
//! println!("{} samples applied", summary.samples_applied);
//! # Ok::<(), orbitstream::error::PipelineError>(())
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::PipelineConfig;
use crate::coordinator::RefreshCoordinator;
use crate::entity::EntityId;
use crate::error::PipelineResult;
use crate::fetch::PositionFetcher;
use crate::pipeline::RefreshPipeline;
use crate::telemetry::{RefreshMetrics, TelemetrySnapshot};
use crate::ticker::{Clock, MonotonicClock};
use crate::worker::{FetchWorker, WorkerHandle};

/// Running pipeline: coordinator on the caller's thread, worker on its own.
///
/// Dropping the service without calling [`shutdown`](Self::shutdown) still
/// stops and joins the worker.
#[derive(Debug)]
pub struct RefreshService<C: Clock = MonotonicClock> {
    // Field order is drop order: the worker is joined before the
    // coordinator releases its reference to the pipeline.
    worker: WorkerHandle,
    coordinator: RefreshCoordinator<C>,
}

impl RefreshService {
    /// Build the pipeline from `config` and start the worker.
    pub fn start<F: PositionFetcher>(config: &PipelineConfig, fetcher: F) -> PipelineResult<Self> {
        Self::start_with_clock(config, fetcher, MonotonicClock)
    }
}

impl<C: Clock> RefreshService<C> {
    /// Like [`RefreshService::start`], with the coordinator timed by `clock`.
    pub fn start_with_clock<F: PositionFetcher>(
        config: &PipelineConfig,
        fetcher: F,
        clock: C,
    ) -> PipelineResult<Self> {
        let pipeline = Arc::new(RefreshPipeline::new(config.entities.iter().copied())?);
        let coordinator = RefreshCoordinator::with_clock(
            Arc::clone(&pipeline),
            config.refresh_cadence_secs,
            config.projection,
            clock,
        )?;
        let worker = FetchWorker::new(pipeline, fetcher)?.spawn()?;

        info!(
            entities = config.entities.len(),
            cadence_secs = config.refresh_cadence_secs,
            "Refresh service started"
        );
        Ok(Self {
            worker,
            coordinator,
        })
    }

    pub fn pipeline(&self) -> &Arc<RefreshPipeline> {
        self.coordinator.pipeline()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator<C> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut RefreshCoordinator<C> {
        &mut self.coordinator
    }

    pub fn metrics(&self) -> &RefreshMetrics {
        self.pipeline().metrics()
    }

    pub fn hold(&self, id: EntityId) -> PipelineResult<bool> {
        self.pipeline().hold(id)
    }

    pub fn resume(&self, id: EntityId) -> PipelineResult<bool> {
        self.pipeline().resume(id)
    }

    /// Stop and join the worker, then return final telemetry.
    pub fn shutdown(self) -> PipelineResult<TelemetrySnapshot> {
        let Self {
            mut worker,
            coordinator,
        } = self;

        worker.join()?;
        let snapshot = coordinator.pipeline().metrics().snapshot();
        info!(
            samples_applied = snapshot.samples_applied,
            fetches = snapshot.total_fetches(),
            uptime = %snapshot.uptime_human(),
            "Refresh service stopped"
        );
        Ok(snapshot)
    }
}

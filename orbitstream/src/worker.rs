//! Background fetch worker and its shutdown handle.
//!
//! The [`FetchWorker`] is a single long-lived thread that:
//! - Sleeps until the pending counter is positive or the stop sentinel is set
//! - Scans every entity once per wake cycle
//! - Invokes the fetcher for pending, non-held entities with their lock held
//! - Applies the result policy, then clears the pending flag and decrements
//!
//! # Cycle
//!
//! ```text
//! ┌──────────────────────────────── FetchWorker ───────────────────────────────┐
//! │  wait(counter > 0 | stop) ──► for each entity:                             │
//! │                                 held?    ──► settle pending, skip          │
//! │                                 pending? ──► lock ─► fetch ─► unlock       │
//! │                                              ─► Hold? set hold flag        │
//! │                                              ─► clear pending, decrement   │
//! │  stop observed ──► exit (outstanding requests are not drained)             │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Samples are committed (lock released) before the pending flag is cleared,
//! so a consumer that sees the flag drop will find the samples on its next
//! try-lock.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use orbitstream::entity::{EntityId, PositionQueue};
//! use orbitstream::fetch::FetchOutcome;
//! use orbitstream::pipeline::RefreshPipeline;
//! use orbitstream::worker::FetchWorker;
//!
//! let pipeline = Arc::new(RefreshPipeline::new([EntityId::new(25338)])?);
//! let fetcher = |_id: EntityId, _q: &mut PositionQueue| FetchOutcome::Reject;
//! let mut handle = FetchWorker::new(Arc::clone(&pipeline), fetcher)?.spawn()?;
//!
//! // ... run the simulation loop ...
//!
//! handle.stop();
//! handle.join()?;
//! # Ok::<(), orbitstream::error::PipelineError>(())
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::entity::TrackedEntity;
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::{FetchOutcome, PositionFetcher};
use crate::pipeline::RefreshPipeline;
use crate::signal::Wake;

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "position-fetch";

// =============================================================================
// Fetch Worker
// =============================================================================

/// Single background fetcher for one pipeline.
pub struct FetchWorker<F: PositionFetcher> {
    pipeline: Arc<RefreshPipeline>,
    fetcher: F,
    wake_rx: mpsc::Receiver<()>,
}

impl<F: PositionFetcher> std::fmt::Debug for FetchWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("entities", &self.pipeline.entities().len())
            .field("pending", &self.pipeline.pending_count())
            .finish_non_exhaustive()
    }
}

impl<F: PositionFetcher> FetchWorker<F> {
    /// Bind a fetcher to a pipeline.
    ///
    /// Each pipeline accepts exactly one worker.
    pub fn new(pipeline: Arc<RefreshPipeline>, fetcher: F) -> PipelineResult<Self> {
        let wake_rx = pipeline
            .pending()
            .take_receiver()
            .ok_or(PipelineError::WorkerAlreadySpawned)?;
        Ok(Self {
            pipeline,
            fetcher,
            wake_rx,
        })
    }

    /// Move the worker onto its own thread.
    pub fn spawn(self) -> PipelineResult<WorkerHandle> {
        let pipeline = Arc::clone(&self.pipeline);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(PipelineError::WorkerSpawn)?;

        info!(
            entities = pipeline.entities().len(),
            "Fetch worker started"
        );
        Ok(WorkerHandle {
            pipeline,
            thread: Some(thread),
        })
    }

    /// Worker loop: wait, scan, repeat until the stop sentinel is seen.
    fn run(mut self) {
        loop {
            match self.pipeline.pending().wait(&mut self.wake_rx) {
                Wake::Stop => break,
                Wake::Work(pending) => {
                    self.pipeline.metrics().wake_cycle();
                    debug!(pending, "Fetch worker woke");
                    self.run_cycle();
                }
            }
        }
        info!("Fetch worker stopped");
    }

    /// Scan every entity once, dispatching pending ones.
    ///
    /// Returns the number of fetcher invocations. Stops early if shutdown is
    /// signalled mid-scan.
    pub fn run_cycle(&mut self) -> usize {
        let pipeline = Arc::clone(&self.pipeline);
        let mut dispatched = 0;

        for entity in pipeline.entities() {
            if pipeline.is_stopped() {
                break;
            }

            if entity.is_held() {
                if entity.clear_pending() {
                    pipeline.pending().decrement();
                    pipeline.metrics().held_skip();
                    debug!(entity = %entity.id(), "Entity update on hold, skipping");
                }
                continue;
            }

            if !entity.is_pending() {
                continue;
            }

            let outcome = self.dispatch(entity);
            dispatched += 1;

            if outcome == FetchOutcome::Hold && entity.set_hold() {
                info!(entity = %entity.id(), "Fetcher requested hold, entity out of rotation");
            }

            // Someone else may have settled it mid-fetch.
            if entity.clear_pending() {
                pipeline.pending().decrement();
            }
        }

        dispatched
    }

    /// Run the fetcher for one entity with its lock held.
    fn dispatch(&mut self, entity: &TrackedEntity) -> FetchOutcome {
        let id = entity.id();
        let mut queue = entity.lock_queue();
        let before = queue.len();

        let fetcher = &mut self.fetcher;
        let result = panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch(id, &mut queue)));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pipeline.metrics().fetch_panicked();
                error!(entity = %id, "Fetcher panicked, treating as reject");
                FetchOutcome::Reject
            }
        };

        if outcome != FetchOutcome::Ok && queue.len() > before {
            warn!(
                entity = %id,
                %outcome,
                discarded = queue.len() - before,
                "Discarding samples appended on a non-ok fetch"
            );
            queue.truncate(before);
        }
        let appended = queue.len() - before;
        drop(queue);

        self.pipeline.metrics().fetch_completed(outcome, appended);
        debug!(entity = %id, %outcome, appended, "Fetch completed");
        outcome
    }
}

// =============================================================================
// Shutdown
// =============================================================================

/// Owner of the worker thread; stops and joins it.
///
/// Dropping the handle stops and joins the worker if that has not happened
/// yet, so shared state never outlives a running worker by accident.
#[derive(Debug)]
pub struct WorkerHandle {
    pipeline: Arc<RefreshPipeline>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Set the stop sentinel and wake the worker.
    ///
    /// Returns `true` for the call that actually signalled; later calls are
    /// no-ops. An in-flight fetch is not interrupted.
    pub fn stop(&self) -> bool {
        let first = self.pipeline.pending().stop();
        if first {
            info!("Fetch worker stop signalled");
        }
        first
    }

    /// Block until the worker thread has exited.
    ///
    /// Signals stop first if nobody has. Safe to call repeatedly.
    pub fn join(&mut self) -> PipelineResult<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| PipelineError::WorkerPanicked),
            None => Ok(()),
        }
    }

    /// Whether the worker thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn pipeline(&self) -> &Arc<RefreshPipeline> {
        &self.pipeline
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.join() {
                warn!(error = %e, "Fetch worker did not shut down cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, EntityState, GeoCoordinate, PositionQueue, PositionSample};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline(raw: &[u32]) -> Arc<RefreshPipeline> {
        Arc::new(RefreshPipeline::new(raw.iter().copied().map(EntityId::new)).unwrap())
    }

    fn one_sample(queue: &mut PositionQueue) {
        queue.push_back(PositionSample::new(
            Utc::now(),
            GeoCoordinate::new(0.0, 0.0, 850.0),
        ));
    }

    #[test]
    fn test_second_worker_rejected() {
        let p = pipeline(&[1]);
        let _first = FetchWorker::new(Arc::clone(&p), |_: EntityId, _: &mut PositionQueue| {
            FetchOutcome::Ok
        })
        .unwrap();
        let second = FetchWorker::new(p, |_: EntityId, _: &mut PositionQueue| FetchOutcome::Ok);
        assert!(matches!(second, Err(PipelineError::WorkerAlreadySpawned)));
    }

    #[test]
    fn test_cycle_dispatches_only_pending() {
        let p = pipeline(&[1, 2, 3]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mut worker = FetchWorker::new(Arc::clone(&p), move |_: EntityId, q: &mut PositionQueue| {
            counted.fetch_add(1, Ordering::SeqCst);
            one_sample(q);
            FetchOutcome::Ok
        })
        .unwrap();

        p.request_refill(EntityId::new(2)).unwrap();
        assert_eq!(worker.run_cycle(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.pending_count(), 0);
        assert_eq!(p.entity(EntityId::new(2)).unwrap().len(), Some(1));
        assert_eq!(p.entity(EntityId::new(1)).unwrap().len(), Some(0));
    }

    #[test]
    fn test_reject_and_retry_leave_entity_idle() {
        let p = pipeline(&[1, 2]);
        let mut worker = FetchWorker::new(Arc::clone(&p), |id: EntityId, _: &mut PositionQueue| {
            if id == EntityId::new(1) {
                FetchOutcome::Reject
            } else {
                FetchOutcome::Retry
            }
        })
        .unwrap();

        p.request_refill(EntityId::new(1)).unwrap();
        p.request_refill(EntityId::new(2)).unwrap();
        assert_eq!(worker.run_cycle(), 2);

        assert_eq!(p.pending_count(), 0);
        assert_eq!(p.entity_state(EntityId::new(1)).unwrap(), EntityState::Idle);
        assert_eq!(p.entity_state(EntityId::new(2)).unwrap(), EntityState::Idle);
        let snapshot = p.metrics().snapshot();
        assert_eq!(snapshot.fetches_rejected, 1);
        assert_eq!(snapshot.fetches_retried, 1);
    }

    #[test]
    fn test_hold_outcome_is_sticky() {
        let p = pipeline(&[1]);
        let id = EntityId::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mut worker = FetchWorker::new(Arc::clone(&p), move |_: EntityId, _: &mut PositionQueue| {
            counted.fetch_add(1, Ordering::SeqCst);
            FetchOutcome::Hold
        })
        .unwrap();

        p.request_refill(id).unwrap();
        worker.run_cycle();
        assert_eq!(p.entity_state(id).unwrap(), EntityState::Held);

        assert!(!p.request_refill(id).unwrap());
        assert_eq!(worker.run_cycle(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.pending_count(), 0);

        let snapshot = p.metrics().snapshot();
        assert_eq!(snapshot.fetches_held, 1);
        assert_eq!(snapshot.holds, 0);
    }

    #[test]
    fn test_request_settled_mid_fetch_is_not_decremented_twice() {
        let first = EntityId::new(2);
        let second = EntityId::new(1);
        let p = pipeline(&[2, 1]);
        let shared = Arc::clone(&p);
        let mut worker = FetchWorker::new(Arc::clone(&p), move |id: EntityId, _: &mut PositionQueue| {
            if id == second {
                // Settle this request out of band, then queue another entity
                // that the scan has already passed.
                if shared.entity(second).unwrap().clear_pending() {
                    shared.pending().decrement();
                }
                shared.request_refill(first).unwrap();
            }
            FetchOutcome::Ok
        })
        .unwrap();

        p.request_refill(second).unwrap();
        assert_eq!(worker.run_cycle(), 1);

        assert!(p.entity(first).unwrap().is_pending());
        assert_eq!(p.pending_count(), 1);

        assert_eq!(worker.run_cycle(), 1);
        assert_eq!(p.pending_count(), 0);
    }

    #[test]
    fn test_held_pending_entity_is_settled_without_fetch() {
        let p = pipeline(&[1]);
        let id = EntityId::new(1);
        let mut worker = FetchWorker::new(
            Arc::clone(&p),
            |_: EntityId, _: &mut PositionQueue| -> FetchOutcome {
                panic!("held entity must not be fetched")
            },
        )
        .unwrap();

        p.request_refill(id).unwrap();
        p.hold(id).unwrap();
        assert_eq!(worker.run_cycle(), 0);

        assert_eq!(p.pending_count(), 0);
        assert!(!p.entity(id).unwrap().is_pending());
        assert_eq!(p.metrics().snapshot().held_skips, 1);
    }

    #[test]
    fn test_samples_from_failed_fetch_are_discarded() {
        let p = pipeline(&[1]);
        let id = EntityId::new(1);
        let mut worker = FetchWorker::new(Arc::clone(&p), |_: EntityId, q: &mut PositionQueue| {
            one_sample(q);
            FetchOutcome::Reject
        })
        .unwrap();

        p.request_refill(id).unwrap();
        worker.run_cycle();
        assert_eq!(p.entity(id).unwrap().len(), Some(0));
    }

    #[test]
    fn test_fetcher_panic_is_contained() {
        let p = pipeline(&[1, 2]);
        let mut worker = FetchWorker::new(Arc::clone(&p), |id: EntityId, q: &mut PositionQueue| {
            if id == EntityId::new(1) {
                panic!("boom");
            }
            one_sample(q);
            FetchOutcome::Ok
        })
        .unwrap();

        p.request_refill(EntityId::new(1)).unwrap();
        p.request_refill(EntityId::new(2)).unwrap();
        assert_eq!(worker.run_cycle(), 2);

        assert_eq!(p.pending_count(), 0);
        assert_eq!(p.entity(EntityId::new(2)).unwrap().len(), Some(1));
        let snapshot = p.metrics().snapshot();
        assert_eq!(snapshot.fetch_panics, 1);
        assert_eq!(snapshot.fetches_rejected, 1);
    }

    #[test]
    fn test_spawned_worker_stops_and_joins() {
        let p = pipeline(&[1]);
        let mut handle = FetchWorker::new(Arc::clone(&p), |_: EntityId, _: &mut PositionQueue| {
            FetchOutcome::Reject
        })
        .unwrap()
        .spawn()
        .unwrap();

        assert!(handle.stop());
        assert!(!handle.stop());
        handle.join().unwrap();
        handle.join().unwrap();
        assert!(handle.is_finished());
        assert!(p.is_stopped());
    }
}

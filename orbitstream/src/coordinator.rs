//! Real-time side of the pipeline.
//!
//! [`RefreshCoordinator`] lives on the simulation thread and never blocks:
//! every queue access is a try-lock, and an empty queue only flips a flag and
//! bumps a counter. Call [`refresh`](RefreshCoordinator::refresh) once per
//! simulation step; it does work only when its own cadence fires.

use std::sync::Arc;

use tracing::trace;

use crate::entity::{EntityId, TrackedEntity};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::RefreshPipeline;
use crate::projection::{WorldPosition, WorldProjection};
use crate::ticker::{CadenceTicker, Clock, MonotonicClock};

/// What happened to one entity on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvanceOutcome {
    /// The oldest sample was applied.
    Advanced(WorldPosition),
    /// Queue was empty; a refill is now outstanding (or already was).
    RefillRequested,
    /// Queue was empty and the entity is on hold.
    Held,
    /// The worker held the lock; skipped this tick.
    Contended,
}

impl AdvanceOutcome {
    pub fn position(&self) -> Option<WorldPosition> {
        match self {
            AdvanceOutcome::Advanced(position) => Some(*position),
            _ => None,
        }
    }
}

/// Per-entity results of one cadence tick, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub entries: Vec<(EntityId, AdvanceOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, id: EntityId) -> Option<AdvanceOutcome> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, outcome)| *outcome)
    }

    /// Entities that moved this tick.
    pub fn advanced(&self) -> impl Iterator<Item = (EntityId, WorldPosition)> + '_ {
        self.entries
            .iter()
            .filter_map(|(id, outcome)| outcome.position().map(|p| (*id, p)))
    }

    pub fn advanced_count(&self) -> usize {
        self.advanced().count()
    }

    pub fn count(&self, predicate: impl Fn(&AdvanceOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Consumer of queued samples, paced by its own ticker.
#[derive(Debug)]
pub struct RefreshCoordinator<C: Clock = MonotonicClock> {
    pipeline: Arc<RefreshPipeline>,
    ticker: CadenceTicker<C>,
    cadence_secs: f64,
    projection: WorldProjection,
    last_positions: Vec<Option<WorldPosition>>,
}

impl RefreshCoordinator {
    pub fn new(
        pipeline: Arc<RefreshPipeline>,
        cadence_secs: f64,
        projection: WorldProjection,
    ) -> PipelineResult<Self> {
        Self::with_clock(pipeline, cadence_secs, projection, MonotonicClock)
    }
}

impl<C: Clock> RefreshCoordinator<C> {
    /// Build a coordinator timed by `clock`.
    ///
    /// The cadence must be finite and positive.
    pub fn with_clock(
        pipeline: Arc<RefreshPipeline>,
        cadence_secs: f64,
        projection: WorldProjection,
        clock: C,
    ) -> PipelineResult<Self> {
        if !cadence_secs.is_finite() || cadence_secs <= 0.0 {
            return Err(PipelineError::InvalidCadence(cadence_secs));
        }
        let last_positions = vec![None; pipeline.entities().len()];
        Ok(Self {
            pipeline,
            ticker: CadenceTicker::with_clock(clock),
            cadence_secs,
            projection,
            last_positions,
        })
    }

    pub fn pipeline(&self) -> &Arc<RefreshPipeline> {
        &self.pipeline
    }

    pub fn cadence_secs(&self) -> f64 {
        self.cadence_secs
    }

    pub fn projection(&self) -> &WorldProjection {
        &self.projection
    }

    /// Seconds until the next cadence tick is due, never negative.
    pub fn time_to_next_tick(&self) -> f64 {
        (self.cadence_secs - self.ticker.peek()).max(0.0)
    }

    /// Per-step entry point.
    ///
    /// Returns `None` when the cadence has not elapsed; otherwise advances or
    /// refills every entity and reports what happened.
    pub fn refresh(&mut self) -> Option<TickReport> {
        if !self.ticker.try_lap(self.cadence_secs) {
            return None;
        }
        self.pipeline.metrics().cadence_tick();

        let pipeline = Arc::clone(&self.pipeline);
        let entries = pipeline
            .entities()
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.id(), self.advance_entity(index, entity)))
            .collect();
        Some(TickReport { entries })
    }

    /// Advance a single entity immediately, ignoring the cadence.
    ///
    /// `None` when the lock was contended, the queue was empty (a refill is
    /// requested), or the identity is unknown.
    pub fn advance(&mut self, id: EntityId) -> Option<WorldPosition> {
        let pipeline = Arc::clone(&self.pipeline);
        let index = pipeline.index_of(id).ok()?;
        self.advance_entity(index, &pipeline.entities()[index])
            .position()
    }

    /// Most recently applied position for an entity.
    pub fn last_position(&self, id: EntityId) -> Option<WorldPosition> {
        let index = self.pipeline.index_of(id).ok()?;
        self.last_positions[index]
    }

    fn advance_entity(&mut self, index: usize, entity: &TrackedEntity) -> AdvanceOutcome {
        let Some(mut queue) = entity.try_lock_queue() else {
            self.pipeline.metrics().contended_skip();
            trace!(entity = %entity.id(), "Queue locked by worker, skipping tick");
            return AdvanceOutcome::Contended;
        };

        match queue.pop_front() {
            Some(sample) => {
                drop(queue);
                let position = self.projection.project(&sample.coordinate());
                self.last_positions[index] = Some(position);
                self.pipeline.metrics().sample_applied();
                AdvanceOutcome::Advanced(position)
            }
            None => {
                drop(queue);
                if entity.request_refill(self.pipeline.pending()) {
                    self.pipeline.metrics().refill_requested();
                    trace!(entity = %entity.id(), "Queue empty, refill requested");
                }
                if entity.is_held() {
                    AdvanceOutcome::Held
                } else {
                    AdvanceOutcome::RefillRequested
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityState, GeoCoordinate, PositionSample};
    use crate::ticker::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn sample(seq: i64, longitude: f64) -> PositionSample {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PositionSample::new(
            base + ChronoDuration::seconds(seq),
            GeoCoordinate::new(0.0, longitude, 0.0),
        )
    }

    fn setup(raw: &[u32], cadence: f64) -> (RefreshCoordinator<ManualClock>, ManualClock) {
        let pipeline =
            Arc::new(RefreshPipeline::new(raw.iter().copied().map(EntityId::new)).unwrap());
        let clock = ManualClock::new();
        let coordinator = RefreshCoordinator::with_clock(
            pipeline,
            cadence,
            WorldProjection::default(),
            clock.clone(),
        )
        .unwrap();
        (coordinator, clock)
    }

    #[test]
    fn test_rejects_bad_cadence() {
        let pipeline = Arc::new(RefreshPipeline::new([EntityId::new(1)]).unwrap());
        for cadence in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result =
                RefreshCoordinator::new(Arc::clone(&pipeline), cadence, WorldProjection::default());
            assert!(matches!(result, Err(PipelineError::InvalidCadence(_))));
        }
    }

    #[test]
    fn test_refresh_waits_for_cadence() {
        let (mut coordinator, clock) = setup(&[1], 1.0);

        clock.advance_secs(0.4);
        assert!(coordinator.refresh().is_none());
        clock.advance_secs(0.7);
        assert!(coordinator.refresh().is_some());
        assert!(coordinator.refresh().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let (mut coordinator, _clock) = setup(&[1], 1.0);
        let id = EntityId::new(1);
        let pipeline = Arc::clone(coordinator.pipeline());
        pipeline
            .append_batch(id, [sample(0, 0.0), sample(1, 90.0), sample(2, -90.0)])
            .unwrap();

        let a = coordinator.advance(id).unwrap();
        let b = coordinator.advance(id).unwrap();
        let c = coordinator.advance(id).unwrap();

        let r = crate::projection::DEFAULT_BASE_RADIUS;
        assert!((a.z - r).abs() < 1e-9);
        assert!((b.x - r).abs() < 1e-9);
        assert!((c.x + r).abs() < 1e-9);
        assert_eq!(coordinator.last_position(id), Some(c));
    }

    #[test]
    fn test_empty_queue_requests_refill_once() {
        let (mut coordinator, clock) = setup(&[1, 2, 3], 1.0);

        clock.advance_secs(1.0);
        let report = coordinator.refresh().unwrap();
        assert_eq!(report.count(|o| *o == AdvanceOutcome::RefillRequested), 3);
        assert_eq!(coordinator.pipeline().pending_count(), 3);

        clock.advance_secs(1.0);
        coordinator.refresh().unwrap();
        assert_eq!(coordinator.pipeline().pending_count(), 3);
        assert_eq!(
            coordinator.pipeline().entity_state(EntityId::new(2)).unwrap(),
            EntityState::Pending
        );
    }

    #[test]
    fn test_contended_entity_is_skipped() {
        let (mut coordinator, clock) = setup(&[1, 2], 1.0);
        let pipeline = Arc::clone(coordinator.pipeline());
        pipeline.append_batch(EntityId::new(1), [sample(0, 0.0)]).unwrap();
        pipeline.append_batch(EntityId::new(2), [sample(0, 0.0)]).unwrap();

        let guard = pipeline.entity(EntityId::new(1)).unwrap().lock_queue();
        clock.advance_secs(1.0);
        let report = coordinator.refresh().unwrap();
        drop(guard);

        assert_eq!(
            report.outcome(EntityId::new(1)),
            Some(AdvanceOutcome::Contended)
        );
        assert!(matches!(
            report.outcome(EntityId::new(2)),
            Some(AdvanceOutcome::Advanced(_))
        ));
        assert_eq!(pipeline.entity(EntityId::new(1)).unwrap().len(), Some(1));
        assert_eq!(pipeline.metrics().snapshot().contended_skips, 1);
    }

    #[test]
    fn test_held_entity_reports_held() {
        let (mut coordinator, clock) = setup(&[1], 0.5);
        let id = EntityId::new(1);
        coordinator.pipeline().hold(id).unwrap();

        clock.advance_secs(0.5);
        let report = coordinator.refresh().unwrap();
        assert_eq!(report.outcome(id), Some(AdvanceOutcome::Held));
        assert_eq!(coordinator.pipeline().pending_count(), 0);
    }

    #[test]
    fn test_unknown_entity_advance_is_none() {
        let (mut coordinator, _clock) = setup(&[1], 1.0);
        assert!(coordinator.advance(EntityId::new(42)).is_none());
        assert!(coordinator.last_position(EntityId::new(42)).is_none());
    }

    #[test]
    fn test_time_to_next_tick() {
        let (coordinator, clock) = setup(&[1], 1.0);
        clock.advance_secs(0.25);
        assert!((coordinator.time_to_next_tick() - 0.75).abs() < 1e-6);
        clock.advance_secs(2.0);
        assert_eq!(coordinator.time_to_next_tick(), 0.0);
    }
}

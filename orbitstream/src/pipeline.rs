//! Shared refresh pipeline state.
//!
//! [`RefreshPipeline`] is the single owned instance that both execution
//! contexts reach through an `Arc`:
//!
//! ```text
//!            ┌───────────────────── RefreshPipeline ─────────────────────┐
//!            │  entities: [TrackedEntity; N]   (fixed at construction)   │
//!            │  pending:  PendingRequestCounter (backlog / wake / stop)  │
//!            │  metrics:  RefreshMetrics                                 │
//!            └───────────────▲───────────────────────────▲───────────────┘
//!                            │ try-lock, pop, refill     │ lock, fetch, settle
//!                 RefreshCoordinator (real-time)     FetchWorker (background)
//! ```
//!
//! The entity set is immutable after construction, so lookups need no lock.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::entity::{EntityId, EntityState, PositionSample, TrackedEntity};
use crate::error::{PipelineError, PipelineResult};
use crate::signal::PendingRequestCounter;
use crate::telemetry::RefreshMetrics;

/// Shared state for one set of tracked entities.
#[derive(Debug)]
pub struct RefreshPipeline {
    entities: Vec<TrackedEntity>,
    pending: PendingRequestCounter,
    metrics: RefreshMetrics,
}

impl RefreshPipeline {
    /// Create one tracked entity per identity.
    ///
    /// Fails on an empty set or a repeated identity.
    pub fn new<I>(ids: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(PipelineError::DuplicateEntity(id));
            }
            entities.push(TrackedEntity::new(id));
        }
        if entities.is_empty() {
            return Err(PipelineError::NoEntities);
        }

        debug!(entities = entities.len(), "Refresh pipeline created");
        Ok(Self {
            entities,
            pending: PendingRequestCounter::new(),
            metrics: RefreshMetrics::new(),
        })
    }

    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(TrackedEntity::id)
    }

    pub fn entity(&self, id: EntityId) -> PipelineResult<&TrackedEntity> {
        self.index_of(id).map(|i| &self.entities[i])
    }

    pub(crate) fn index_of(&self, id: EntityId) -> PipelineResult<usize> {
        self.entities
            .iter()
            .position(|e| e.id() == id)
            .ok_or(PipelineError::UnknownEntity(id))
    }

    pub fn pending(&self) -> &PendingRequestCounter {
        &self.pending
    }

    /// Current pending-request count (or the stop sentinel).
    pub fn pending_count(&self) -> i64 {
        self.pending.value()
    }

    pub fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }

    pub fn entity_state(&self, id: EntityId) -> PipelineResult<EntityState> {
        Ok(self.entity(id)?.state())
    }

    /// Request a refill for one entity.
    ///
    /// `Ok(false)` when already pending, held, or the pipeline is stopped.
    pub fn request_refill(&self, id: EntityId) -> PipelineResult<bool> {
        let requested = self.entity(id)?.request_refill(&self.pending);
        if requested {
            self.metrics.refill_requested();
        }
        Ok(requested)
    }

    /// Append samples for one entity and settle its pending request.
    ///
    /// Producer-side; blocks on the entity lock, so it must not be called
    /// from inside a fetcher for the entity being fetched. Decrements the
    /// counter only if the entity was pending.
    pub fn append_batch<I>(&self, id: EntityId, samples: I) -> PipelineResult<()>
    where
        I: IntoIterator<Item = PositionSample>,
    {
        if self.entity(id)?.append_batch(samples) {
            self.pending.decrement();
        }
        Ok(())
    }

    /// Take an entity out of fetch rotation.
    ///
    /// Returns whether the flag changed. Callable from any thread.
    pub fn hold(&self, id: EntityId) -> PipelineResult<bool> {
        let entity = self.entity(id).inspect_err(|_| {
            warn!(entity = %id, "Hold requested for unknown entity");
        })?;
        let changed = entity.set_hold();
        if changed {
            self.metrics.hold();
            info!(entity = %id, "Entity updates on hold");
        }
        Ok(changed)
    }

    /// Clear an entity's hold flag.
    ///
    /// Returns whether the flag changed. The entity rejoins rotation the
    /// next time the coordinator finds its queue empty. Callable from any
    /// thread.
    pub fn resume(&self, id: EntityId) -> PipelineResult<bool> {
        let entity = self.entity(id).inspect_err(|_| {
            warn!(entity = %id, "Resume requested for unknown entity");
        })?;
        let changed = entity.clear_hold();
        if changed {
            self.metrics.resume();
            info!(entity = %id, "Entity updates resumed");
        }
        Ok(changed)
    }

    /// Whether shutdown has been signalled.
    pub fn is_stopped(&self) -> bool {
        self.pending.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::GeoCoordinate;
    use chrono::Utc;

    fn ids(raw: &[u32]) -> Vec<EntityId> {
        raw.iter().copied().map(EntityId::new).collect()
    }

    #[test]
    fn test_rejects_empty_entity_set() {
        assert!(matches!(
            RefreshPipeline::new(Vec::<EntityId>::new()),
            Err(PipelineError::NoEntities)
        ));
    }

    #[test]
    fn test_rejects_duplicate_entity() {
        let err = RefreshPipeline::new(ids(&[1, 2, 1])).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateEntity(id) if id == EntityId::new(1)));
    }

    #[test]
    fn test_unknown_entity_operations_fail() {
        let pipeline = RefreshPipeline::new(ids(&[1])).unwrap();
        let missing = EntityId::new(99);

        assert!(matches!(
            pipeline.request_refill(missing),
            Err(PipelineError::UnknownEntity(_))
        ));
        assert!(pipeline.resume(missing).is_err());
        assert!(pipeline.hold(missing).is_err());
        assert!(pipeline.entity_state(missing).is_err());
    }

    #[test]
    fn test_request_refill_single_in_flight() {
        let pipeline = RefreshPipeline::new(ids(&[1, 2])).unwrap();

        assert!(pipeline.request_refill(EntityId::new(1)).unwrap());
        assert!(!pipeline.request_refill(EntityId::new(1)).unwrap());
        assert!(pipeline.request_refill(EntityId::new(2)).unwrap());
        assert_eq!(pipeline.pending_count(), 2);
        assert_eq!(pipeline.metrics().snapshot().refills_requested, 2);
    }

    #[test]
    fn test_append_batch_settles_counter() {
        let pipeline = RefreshPipeline::new(ids(&[1])).unwrap();
        let id = EntityId::new(1);
        pipeline.request_refill(id).unwrap();

        let sample = PositionSample::new(Utc::now(), GeoCoordinate::new(1.0, 2.0, 800.0));
        pipeline.append_batch(id, [sample]).unwrap();

        assert_eq!(pipeline.pending_count(), 0);
        assert_eq!(pipeline.entity_state(id).unwrap(), EntityState::Idle);
        assert_eq!(pipeline.entity(id).unwrap().len(), Some(1));
    }

    #[test]
    fn test_hold_and_resume() {
        let pipeline = RefreshPipeline::new(ids(&[1])).unwrap();
        let id = EntityId::new(1);

        assert!(pipeline.hold(id).unwrap());
        assert!(!pipeline.request_refill(id).unwrap());
        assert_eq!(pipeline.entity_state(id).unwrap(), EntityState::Held);

        assert!(pipeline.resume(id).unwrap());
        assert!(!pipeline.resume(id).unwrap());
        assert!(pipeline.request_refill(id).unwrap());

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.holds, 1);
        assert_eq!(snapshot.resumes, 1);
    }
}

//! Escalate repeated transient failures into a hold.
//!
//! The worker treats `Reject` and `Retry` as "try again on the next empty
//! tick", so an entity whose source is permanently broken would be retried
//! once per cadence forever. [`HoldAfterFailures`] counts consecutive
//! transient failures per entity and converts the `threshold`-th one into
//! `Hold`, taking the entity out of rotation until an operator resumes it.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{FetchOutcome, PositionFetcher};
use crate::entity::{EntityId, PositionQueue};

/// Default number of consecutive failures before holding an entity.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Wraps a fetcher and holds entities that keep failing.
#[derive(Debug)]
pub struct HoldAfterFailures<F> {
    inner: F,
    threshold: u32,
    streaks: HashMap<EntityId, u32>,
}

impl<F: PositionFetcher> HoldAfterFailures<F> {
    pub fn new(inner: F) -> Self {
        Self::with_threshold(inner, DEFAULT_FAILURE_THRESHOLD)
    }

    /// A threshold of zero is treated as one.
    pub fn with_threshold(inner: F, threshold: u32) -> Self {
        Self {
            inner,
            threshold: threshold.max(1),
            streaks: HashMap::new(),
        }
    }

    /// Current consecutive-failure count for an entity.
    pub fn streak(&self, id: EntityId) -> u32 {
        self.streaks.get(&id).copied().unwrap_or(0)
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: PositionFetcher> PositionFetcher for HoldAfterFailures<F> {
    fn fetch(&mut self, id: EntityId, queue: &mut PositionQueue) -> FetchOutcome {
        let outcome = self.inner.fetch(id, queue);

        if !outcome.is_transient_failure() {
            // A hold starts a fresh streak once the entity is resumed.
            self.streaks.remove(&id);
            return outcome;
        }

        let streak = self.streaks.entry(id).or_insert(0);
        *streak += 1;
        debug!(entity = %id, streak = *streak, %outcome, "Transient fetch failure");

        if *streak >= self.threshold {
            warn!(
                entity = %id,
                failures = *streak,
                "Consecutive fetch failures, holding entity"
            );
            self.streaks.remove(&id);
            return FetchOutcome::Hold;
        }

        outcome
    }
}

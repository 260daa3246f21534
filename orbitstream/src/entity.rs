//! Tracked entities and their position queues.
//!
//! Each [`TrackedEntity`] owns a FIFO of [`PositionSample`]s behind its own
//! lock plus two flags:
//!
//! - **pending**: a refill has been requested and not yet dispatched. Claimed
//!   with a compare-exchange so an entity never has two requests in flight.
//! - **hold**: the entity is out of fetch rotation. Set by the worker on a
//!   `Hold` outcome or by an operator; cleared only by an explicit resume.
//!
//! # Lock discipline
//!
//! The worker (producer) takes the queue lock with [`TrackedEntity::lock_queue`]
//! and may block on it. The coordinator (consumer) only ever uses
//! [`TrackedEntity::try_lock_queue`] and treats contention as "try again next
//! tick".

use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

use crate::signal::PendingRequestCounter;

// =============================================================================
// Identity and samples
// =============================================================================

/// Stable external identity of a tracked entity (a NORAD catalog number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(catalog_number: u32) -> Self {
        Self(catalog_number)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        s.strip_prefix('#').unwrap_or(s).parse().map(EntityId)
    }
}

impl From<u32> for EntityId {
    fn from(catalog_number: u32) -> Self {
        Self(catalog_number)
    }
}

/// Geodetic coordinate of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
    /// Altitude above the reference ellipsoid in kilometres.
    pub altitude_km: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64, altitude_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_km,
        }
    }
}

/// One predicted position. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    timestamp: DateTime<Utc>,
    coordinate: GeoCoordinate,
}

impl PositionSample {
    pub fn new(timestamp: DateTime<Utc>, coordinate: GeoCoordinate) -> Self {
        Self {
            timestamp,
            coordinate,
        }
    }

    /// Instant the prediction applies to.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn coordinate(&self) -> GeoCoordinate {
        self.coordinate
    }
}

// =============================================================================
// Queue
// =============================================================================

/// FIFO of samples for one entity.
///
/// Fetchers receive `&mut PositionQueue` while the worker holds the lock and
/// append with [`push_back`](Self::push_back) or [`extend`](Extend::extend).
#[derive(Debug, Default, Clone)]
pub struct PositionQueue {
    samples: VecDeque<PositionSample>,
}

impl PositionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, sample: PositionSample) {
        self.samples.push_back(sample);
    }

    /// Remove and return the oldest sample.
    pub fn pop_front(&mut self) -> Option<PositionSample> {
        self.samples.pop_front()
    }

    pub fn front(&self) -> Option<&PositionSample> {
        self.samples.front()
    }

    /// Newest sample, if any.
    pub fn back(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    /// Drop everything past the first `len` samples.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }
}

impl Extend<PositionSample> for PositionQueue {
    fn extend<T: IntoIterator<Item = PositionSample>>(&mut self, iter: T) {
        self.samples.extend(iter);
    }
}

// =============================================================================
// Tracked entity
// =============================================================================

/// Refresh state of one entity.
///
/// ```text
/// Idle ──(queue empties)──► Pending ──(Ok/Reject/Retry)──► Idle
///                              │
///                              └──(Hold)──► Held ──(resume)──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Idle,
    Pending,
    Held,
}

impl EntityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Idle => "idle",
            EntityState::Pending => "pending",
            EntityState::Held => "held",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked entity: queue plus pending/hold flags.
#[derive(Debug)]
pub struct TrackedEntity {
    id: EntityId,
    queue: Mutex<PositionQueue>,
    pending: AtomicBool,
    hold: AtomicBool,
}

impl TrackedEntity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            queue: Mutex::new(PositionQueue::new()),
            pending: AtomicBool::new(false),
            hold: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Pop the oldest sample without blocking.
    ///
    /// `None` when the queue is empty or another context holds the lock.
    pub fn try_pop_front(&self) -> Option<PositionSample> {
        self.queue.try_lock()?.pop_front()
    }

    /// Whether the queue is empty; `None` when the lock is contended.
    pub fn is_empty(&self) -> Option<bool> {
        self.queue.try_lock().map(|q| q.is_empty())
    }

    /// Queued sample count; `None` when the lock is contended.
    pub fn len(&self) -> Option<usize> {
        self.queue.try_lock().map(|q| q.len())
    }

    /// Non-blocking lock for the consumer side.
    pub fn try_lock_queue(&self) -> Option<MutexGuard<'_, PositionQueue>> {
        self.queue.try_lock()
    }

    /// Blocking lock for the worker side. Never call from the real-time thread.
    pub fn lock_queue(&self) -> MutexGuard<'_, PositionQueue> {
        self.queue.lock()
    }

    /// Mark the entity pending and bump the counter.
    ///
    /// No-op returning `false` when already pending, held, or stopped.
    ///
    /// The counter is bumped before the flag becomes visible, so the worker
    /// can never settle a request that has not been counted yet.
    pub fn request_refill(&self, counter: &PendingRequestCounter) -> bool {
        if self.is_held() || self.is_pending() {
            return false;
        }
        if !counter.increment() {
            return false;
        }
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Lost a race with another requester.
            counter.decrement();
            return false;
        }
        true
    }

    /// Extend the queue, then clear the pending flag.
    ///
    /// Returns whether the entity was pending, so the caller can settle the
    /// counter.
    pub(crate) fn append_batch<I>(&self, samples: I) -> bool
    where
        I: IntoIterator<Item = PositionSample>,
    {
        self.queue.lock().extend(samples);
        self.clear_pending()
    }

    /// Clear the pending flag, returning whether it was set.
    pub(crate) fn clear_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_held(&self) -> bool {
        self.hold.load(Ordering::Acquire)
    }

    /// Set the hold flag, returning whether this call changed it.
    pub fn set_hold(&self) -> bool {
        !self.hold.swap(true, Ordering::AcqRel)
    }

    /// Clear the hold flag, returning whether this call changed it.
    pub fn clear_hold(&self) -> bool {
        self.hold.swap(false, Ordering::AcqRel)
    }

    pub fn state(&self) -> EntityState {
        if self.is_held() {
            EntityState::Held
        } else if self.is_pending() {
            EntityState::Pending
        } else {
            EntityState::Idle
        }
    }
}

//! Fetcher interface consumed by the worker.
//!
//! A [`PositionFetcher`] is invoked by the fetch worker, once per pending
//! entity per cycle, with that entity's queue lock held. It appends samples
//! and reports a [`FetchOutcome`]; the worker applies the result policy:
//!
//! | Outcome  | Worker action                                             |
//! |----------|-----------------------------------------------------------|
//! | `Ok`     | none; samples are already queued                          |
//! | `Reject` | drop the attempt; the next empty tick re-requests         |
//! | `Retry`  | same as `Reject`; backoff belongs to the fetcher          |
//! | `Hold`   | set the hold flag; no more fetches until resumed          |
//!
//! Fetchers must return promptly: the worker is single-threaded and a slow
//! fetch delays every other entity.
//!
//! Closures implement the trait directly:
//!
//! ```
//! use orbitstream::entity::{EntityId, PositionQueue};
//! use orbitstream::fetch::{FetchOutcome, PositionFetcher};
//!
//! let mut fetcher = |_id: EntityId, _queue: &mut PositionQueue| FetchOutcome::Reject;
//! let mut queue = PositionQueue::new();
//! assert_eq!(fetcher.fetch(EntityId::new(1), &mut queue), FetchOutcome::Reject);
//! ```

mod escalation;
mod synthetic;

use std::fmt;

use crate::entity::{EntityId, PositionQueue};

pub use escalation::{HoldAfterFailures, DEFAULT_FAILURE_THRESHOLD};
pub use synthetic::{
    OrbitElements, SyntheticOrbitConfig, SyntheticOrbitFetcher, DEFAULT_BATCH_SIZE,
    DEFAULT_STEP_SECS,
};

/// Result code returned by a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
    /// Samples were appended.
    Ok,
    /// The attempt failed; nothing appended.
    Reject,
    /// Transient failure; nothing appended.
    Retry,
    /// Stop fetching this entity until resumed.
    Hold,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Ok => "ok",
            FetchOutcome::Reject => "reject",
            FetchOutcome::Retry => "retry",
            FetchOutcome::Hold => "hold",
        }
    }

    /// `Reject` or `Retry`.
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, FetchOutcome::Reject | FetchOutcome::Retry)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies position samples for an entity.
///
/// Runs on the worker thread with the entity's queue lock held. Append to
/// `queue` only when returning [`FetchOutcome::Ok`].
pub trait PositionFetcher: Send + 'static {
    fn fetch(&mut self, id: EntityId, queue: &mut PositionQueue) -> FetchOutcome;
}

impl<F> PositionFetcher for F
where
    F: FnMut(EntityId, &mut PositionQueue) -> FetchOutcome + Send + 'static,
{
    fn fetch(&mut self, id: EntityId, queue: &mut PositionQueue) -> FetchOutcome {
        self(id, queue)
    }
}

//! Error types for the refresh pipeline.
//!
//! Fetch failures are not errors here: they are reported through
//! [`FetchOutcome`](crate::fetch::FetchOutcome) and absorbed by the worker.
//! Only construction, administration, and lifecycle faults surface as errors.

use std::io;

use thiserror::Error;

use crate::entity::EntityId;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by pipeline construction and administration.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The identity is not part of the configured entity set.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// The same identity was configured twice.
    #[error("Duplicate entity in configuration: {0}")]
    DuplicateEntity(EntityId),

    /// No entities were configured.
    #[error("At least one entity must be configured")]
    NoEntities,

    /// Cadence must be a finite, positive number of seconds.
    #[error("Invalid refresh cadence: {0} seconds")]
    InvalidCadence(f64),

    /// The fetch worker has already been started for this pipeline.
    #[error("Fetch worker already spawned for this pipeline")]
    WorkerAlreadySpawned,

    /// The OS refused to spawn the worker thread.
    #[error("Failed to spawn fetch worker: {0}")]
    WorkerSpawn(#[source] io::Error),

    /// The worker thread panicked outside the fetch guard.
    #[error("Fetch worker panicked")]
    WorkerPanicked,
}

//! Orbitstream - asynchronous position refresh for real-time simulations
//!
//! This library keeps a fixed set of tracked entities (satellites, by NORAD
//! catalog number) supplied with timestamped positions from a slow external
//! source, while a real-time loop consumes those positions at a fixed rate
//! without ever blocking on I/O.
//!
//! # Architecture
//!
//! ```text
//! simulation loop                                      background thread
//! ───────────────                                      ─────────────────
//! RefreshCoordinator ──try-lock/pop──┐    ┌──lock/append── FetchWorker
//!   (CadenceTicker)                  ▼    ▼                  (PositionFetcher)
//!                              RefreshPipeline
//!                    TrackedEntity × N + PendingRequestCounter
//!                                    │
//!                     WorkerHandle ──┴── stop sentinel + join
//! ```
//!
//! [`service::RefreshService`] wires these together from a
//! [`config::PipelineConfig`].

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod projection;
pub mod service;
pub mod signal;
pub mod telemetry;
pub mod ticker;
pub mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use coordinator::{AdvanceOutcome, RefreshCoordinator, TickReport};
pub use entity::{EntityId, EntityState, GeoCoordinate, PositionQueue, PositionSample};
pub use error::{PipelineError, PipelineResult};
pub use fetch::{FetchOutcome, PositionFetcher};
pub use pipeline::RefreshPipeline;
pub use projection::{WorldPosition, WorldProjection};
pub use service::RefreshService;
pub use worker::{FetchWorker, WorkerHandle};

/// Crate version, for CLI banners and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

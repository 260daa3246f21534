//! Synthetic circular-orbit position source.
//!
//! Produces plausible ground tracks without a network service, so the
//! pipeline can be exercised end to end by the CLI and by tests. Each entity
//! gets fixed [`OrbitElements`] (derived from its catalog number unless set
//! explicitly) and a per-entity cursor, so successive batches continue the
//! same track without gaps or overlaps.

use std::collections::HashMap;
use std::f64::consts::TAU;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::{FetchOutcome, PositionFetcher};
use crate::entity::{EntityId, GeoCoordinate, PositionQueue, PositionSample};
use crate::projection::EARTH_RADIUS_KM;

/// Default samples produced per fetch.
pub const DEFAULT_BATCH_SIZE: usize = 60;

/// Default spacing between samples in seconds.
pub const DEFAULT_STEP_SECS: u32 = 1;

/// Earth's gravitational parameter, km³/s².
const EARTH_MU: f64 = 398_600.4418;

/// Sidereal rotation rate of the Earth, rad/s.
const EARTH_ROTATION_RATE: f64 = TAU / 86_164.0905;

/// Sun-synchronous inclination typical of polar weather satellites.
const DEFAULT_INCLINATION_DEG: f64 = 98.7;

/// Orbital period typical of polar weather satellites, seconds.
const DEFAULT_PERIOD_SECS: f64 = 101.5 * 60.0;

/// Configuration for [`SyntheticOrbitFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticOrbitConfig {
    /// Samples appended per fetch.
    pub batch_size: usize,
    /// Seconds between consecutive samples.
    pub step_secs: u32,
}

impl Default for SyntheticOrbitConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            step_secs: DEFAULT_STEP_SECS,
        }
    }
}

impl SyntheticOrbitConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_step_secs(mut self, step_secs: u32) -> Self {
        self.step_secs = step_secs;
        self
    }
}

/// Circular orbit description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitElements {
    pub inclination_deg: f64,
    pub period_secs: f64,
    /// Right ascension of the ascending node at the epoch, degrees.
    pub raan_deg: f64,
    /// Argument of latitude at the epoch, degrees.
    pub phase_deg: f64,
}

impl OrbitElements {
    /// Polar orbit with node and phase spread by catalog number.
    pub fn for_entity(id: EntityId) -> Self {
        let n = id.get() as f64;
        Self {
            inclination_deg: DEFAULT_INCLINATION_DEG,
            period_secs: DEFAULT_PERIOD_SECS,
            raan_deg: (n * 37.0) % 360.0,
            phase_deg: (n * 113.0) % 360.0,
        }
    }

    /// Altitude of a circular orbit with this period, km.
    pub fn altitude_km(&self) -> f64 {
        let semi_major = (EARTH_MU * self.period_secs.powi(2) / (TAU * TAU)).cbrt();
        semi_major - EARTH_RADIUS_KM
    }

    /// Sub-satellite point `elapsed_secs` after the epoch.
    pub fn position_at(&self, elapsed_secs: f64) -> GeoCoordinate {
        let inclination = self.inclination_deg.to_radians();
        let u = self.phase_deg.to_radians() + TAU * elapsed_secs / self.period_secs;

        let latitude = (inclination.sin() * u.sin()).asin();
        let node_offset = (inclination.cos() * u.sin()).atan2(u.cos());
        let longitude = self.raan_deg.to_radians() + node_offset
            - EARTH_ROTATION_RATE * elapsed_secs;

        GeoCoordinate::new(
            latitude.to_degrees(),
            wrap_longitude(longitude.to_degrees()),
            self.altitude_km(),
        )
    }
}

/// Wrap into `[-180, 180)`.
fn wrap_longitude(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Fetcher that generates circular-orbit samples.
#[derive(Debug)]
pub struct SyntheticOrbitFetcher {
    config: SyntheticOrbitConfig,
    epoch: DateTime<Utc>,
    elements: HashMap<EntityId, OrbitElements>,
    cursors: HashMap<EntityId, DateTime<Utc>>,
}

impl SyntheticOrbitFetcher {
    /// Start every track at the current wall-clock time.
    pub fn new(config: SyntheticOrbitConfig) -> Self {
        Self::starting_at(config, Utc::now())
    }

    /// Start every track at `epoch`.
    pub fn starting_at(config: SyntheticOrbitConfig, epoch: DateTime<Utc>) -> Self {
        Self {
            config,
            epoch,
            elements: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Override the orbit for one entity.
    pub fn with_elements(mut self, id: EntityId, elements: OrbitElements) -> Self {
        self.elements.insert(id, elements);
        self
    }

    pub fn config(&self) -> &SyntheticOrbitConfig {
        &self.config
    }

    /// Timestamp the next batch for `id` will start at.
    pub fn next_timestamp(&self, id: EntityId) -> DateTime<Utc> {
        self.cursors.get(&id).copied().unwrap_or(self.epoch)
    }
}

impl PositionFetcher for SyntheticOrbitFetcher {
    fn fetch(&mut self, id: EntityId, queue: &mut PositionQueue) -> FetchOutcome {
        if self.config.batch_size == 0 {
            return FetchOutcome::Reject;
        }

        let elements = *self
            .elements
            .entry(id)
            .or_insert_with(|| OrbitElements::for_entity(id));
        let step = ChronoDuration::seconds(i64::from(self.config.step_secs.max(1)));
        let mut at = self.next_timestamp(id);

        for _ in 0..self.config.batch_size {
            let elapsed = (at - self.epoch).num_milliseconds() as f64 / 1000.0;
            queue.push_back(PositionSample::new(at, elements.position_at(elapsed)));
            at += step;
        }

        self.cursors.insert(id, at);
        FetchOutcome::Ok
    }
}

//! Geodetic to world-space conversion.
//!
//! World space is Y-up and right-handed, with the globe centred at the origin
//! and the prime meridian on +Z. Latitude and longitude map onto a sphere of
//! `base_radius`; altitude is ignored unless `altitude_exaggeration` is set.

use crate::entity::GeoCoordinate;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default world radius of the orbit shell (globe radius is 1.0).
pub const DEFAULT_BASE_RADIUS: f64 = 1.086;

/// A point in render-owned world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl WorldPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance from the world origin.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldProjection {
    /// Radius, in world units, at which entities are placed.
    pub base_radius: f64,
    /// Scale applied to `altitude / EARTH_RADIUS_KM` on top of the base radius.
    /// Zero places every entity on the base shell.
    pub altitude_exaggeration: f64,
}

impl Default for WorldProjection {
    fn default() -> Self {
        Self {
            base_radius: DEFAULT_BASE_RADIUS,
            altitude_exaggeration: 0.0,
        }
    }
}

impl WorldProjection {
    pub fn with_base_radius(mut self, radius: f64) -> Self {
        self.base_radius = radius;
        self
    }

    pub fn with_altitude_exaggeration(mut self, factor: f64) -> Self {
        self.altitude_exaggeration = factor;
        self
    }

    /// Project a geodetic coordinate into world space.
    pub fn project(&self, coord: &GeoCoordinate) -> WorldPosition {
        let lat = coord.latitude.to_radians();
        let lon = coord.longitude.to_radians();
        let radius = self.base_radius
            * (1.0 + self.altitude_exaggeration * coord.altitude_km / EARTH_RADIUS_KM);

        WorldPosition {
            x: radius * lat.cos() * lon.sin(),
            y: radius * lat.sin(),
            z: radius * lat.cos() * lon.cos(),
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate and zone centroid types.
//!
//! A [`Zone`] is one row of the zone reference table: an integer id and the
//! centroid the zone is represented by. Zones are loaded once at startup and
//! never mutated.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in kilometres, used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Zone identifier as it appears in the zone reference table.
pub type ZoneId = i64;

/// Errors from constructing or parsing a [`Coordinate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude outside `[-90, 90]` or not finite.
    #[error("latitude {0} is out of range [-90, 90]")]
    Latitude(f64),

    /// Longitude outside `[-180, 180]` or not finite.
    #[error("longitude {0} is out of range [-180, 180]")]
    Longitude(f64),

    /// Text that is not a `"<lat>,<lon>"` pair.
    #[error("'{0}' is not a coordinate pair")]
    Syntax(String),
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if either component is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Checks that both components are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] naming the first offending component.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoordinateError::Latitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoordinateError::Longitude(self.longitude));
        }
        Ok(())
    }

    /// Squared Euclidean distance in degree space.
    ///
    /// This is the metric zone assignment is defined on; it is not a
    /// geodesic distance.
    #[must_use]
    pub fn squared_distance(&self, other: &Self) -> f64 {
        let d_lat = self.latitude - other.latitude;
        let d_lon = self.longitude - other.longitude;
        d_lat.mul_add(d_lat, d_lon * d_lon)
    }

    /// Great-circle (haversine) distance in kilometres.
    #[must_use]
    pub fn haversine_km(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (lat1.cos() * lat2.cos())
            .mul_add((d_lon / 2.0).sin().powi(2), (d_lat / 2.0).sin().powi(2));
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Parses `"<lat>,<lon>"` (whitespace around either number allowed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| CoordinateError::Syntax(s.to_string()))?;
        let latitude: f64 = lat
            .trim()
            .parse()
            .map_err(|_| CoordinateError::Syntax(s.to_string()))?;
        let longitude: f64 = lon
            .trim()
            .parse()
            .map_err(|_| CoordinateError::Syntax(s.to_string()))?;
        Self::new(latitude, longitude)
    }
}

/// A zone centroid from the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier.
    pub zone_id: ZoneId,
    /// Centroid latitude.
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Centroid longitude.
    #[serde(rename = "lon")]
    pub longitude: f64,
}

impl Zone {
    /// Returns the zone centroid as a [`Coordinate`].
    #[must_use]
    pub const fn centroid(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Place name geocoding for the surge predictor.
//!
//! Converts free-text place names ("JFK Airport", "Times Square") to
//! coordinates using one of two interchangeable providers configured via
//! TOML files in `services/`:
//!
//! 1. **Nominatim / `OpenStreetMap`** - free, no API key, rate limited.
//!    Transient failures are retried with a fixed backoff.
//! 2. **Google Maps Geocoding** - key-authenticated. The key is read from
//!    the environment, never from configuration files.
//!
//! Every provider error ends up as [`GeocodeError::Unresolvable`] at the
//! [`PlaceResolver`] boundary so callers only have to deal with one
//! client-facing failure. Results can be memoized in a bounded TTL
//! [`cache::GeocodeCache`].

pub mod cache;
pub mod google;
pub mod nominatim;
pub mod resolver;
pub mod retry;
pub mod service_registry;

use async_trait::async_trait;
use surge_geography_models::Coordinate;
use thiserror::Error;

pub use resolver::{CachedResolver, HttpPlaceResolver, ResolverSettings, build_resolver};

/// A resolved place.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    /// Resolved position (WGS84).
    pub coordinate: Coordinate,
    /// Canonical name returned by the provider, if any.
    pub display_name: Option<String>,
    /// Which provider resolved the place.
    pub provider: GeocodingProvider,
}

/// Which geocoding provider resolved a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodingProvider {
    /// Nominatim / `OpenStreetMap`.
    Nominatim,
    /// Google Maps Geocoding API.
    Google,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The place could not be resolved. This is the only error a
    /// [`PlaceResolver`] returns for a bad or unknown place name.
    #[error("could not resolve location '{place}'")]
    Unresolvable {
        /// The place name exactly as the caller supplied it.
        place: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Temporary provider failure (rate limit, server error, quota).
    #[error("transient provider error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("provider returned status {status}")]
    Provider {
        /// Status reported by the provider.
        status: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Resolver configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

impl GeocodeError {
    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Http(e) => retry::is_transient(e),
            Self::Unresolvable { .. }
            | Self::Provider { .. }
            | Self::Parse { .. }
            | Self::Config { .. } => false,
        }
    }
}

/// Resolves free-text place names to coordinates.
#[async_trait]
pub trait PlaceResolver: Send + Sync {
    /// Resolves `place` to a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Unresolvable`] if the provider has no match,
    /// reports a non-success status, or keeps failing transiently.
    async fn resolve(&self, place: &str) -> Result<GeocodedPlace, GeocodeError>;
}

/// Normalizes a place name for cache lookups: trims, collapses inner
/// whitespace and lowercases.
#[must_use]
pub fn normalize_place_name(place: &str) -> String {
    place
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

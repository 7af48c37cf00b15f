#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the surge predictor server.
//!
//! These types are serialized to JSON (or decoded from form bodies) for the
//! REST API. They are separate from the pipeline types so the wire contract
//! can evolve independently.

use serde::{Deserialize, Serialize};
use surge_geography_models::ZoneId;
use surge_models::{
    FeatureRow, PredictionResult, ResolvedLocation, SurgeLabel, round_probability,
};

/// A trip endpoint in a JSON request: coordinates or text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiLocation {
    /// Explicit coordinates.
    Coordinates {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// A place name or a `"<lat>,<lon>"` string.
    Text(String),
}

/// JSON body of `POST /api/predict_surge`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPredictRequest {
    /// Trip origin.
    #[serde(alias = "from_area")]
    pub origin: ApiLocation,
    /// Trip destination.
    #[serde(alias = "to_area")]
    pub destination: ApiLocation,
    /// Trip time (RFC 3339 or `YYYY-MM-DDTHH:MM:SS`); now when absent.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Peak/off-peak toggle.
    #[serde(default)]
    pub peak: Option<bool>,
}

/// Form body of `POST /api/predict_surge`.
///
/// Empty fields are treated as absent, as HTML forms submit them.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPredictForm {
    /// Trip origin (place name or `"<lat>,<lon>"`).
    #[serde(alias = "from_area")]
    pub origin: String,
    /// Trip destination (place name or `"<lat>,<lon>"`).
    #[serde(alias = "to_area")]
    pub destination: String,
    /// Trip time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// `true`/`false` (also `on`/`off`, `1`/`0`).
    #[serde(default)]
    pub peak: Option<String>,
}

/// Parses a form toggle. `Ok(None)` for an empty or missing value.
///
/// # Errors
///
/// Returns the rejected text if it is not a recognized boolean.
pub fn parse_toggle(value: Option<&str>) -> Result<Option<bool>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("on") => {
            Ok(Some(true))
        }
        Some(v)
            if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("off") =>
        {
            Ok(Some(false))
        }
        Some(v) => Err(v.to_string()),
    }
}

/// A resolved trip endpoint in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResolvedLocation {
    /// Place name as submitted, for text input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resolved latitude.
    pub latitude: f64,
    /// Resolved longitude.
    pub longitude: f64,
    /// Nearest zone.
    pub zone_id: ZoneId,
}

impl From<ResolvedLocation> for ApiResolvedLocation {
    fn from(location: ResolvedLocation) -> Self {
        Self {
            name: location.name,
            latitude: location.coordinate.latitude,
            longitude: location.coordinate.longitude,
            zone_id: location.zone_id,
        }
    }
}

/// Response of `POST /api/predict_surge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPrediction {
    /// Zone of the origin.
    pub origin_zone: ZoneId,
    /// Zone of the destination.
    pub destination_zone: ZoneId,
    /// Surge probability, rounded to 3 decimal places.
    pub surge_probability: f64,
    /// Demand band.
    pub surge_label: SurgeLabel,
    /// Travel time estimate in minutes, rounded to 1 decimal place.
    pub eta_minutes: f64,
    /// Resolved origin.
    pub origin: ApiResolvedLocation,
    /// Resolved destination.
    pub destination: ApiResolvedLocation,
    /// Model input row.
    pub features: FeatureRow,
}

impl From<PredictionResult> for ApiPrediction {
    fn from(result: PredictionResult) -> Self {
        Self {
            origin_zone: result.origin_zone(),
            destination_zone: result.destination_zone(),
            surge_probability: round_probability(result.surge_probability),
            surge_label: result.surge_label,
            eta_minutes: round_to(result.eta_minutes, 1),
            origin: result.origin.into(),
            destination: result.destination.into(),
            features: result.features,
        }
    }
}

/// Rounds `value` to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

/// JSON body of `POST /api/predict_point`: surge at a single pickup point.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPointRequest {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Pickup time; now when absent.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Peak/off-peak toggle.
    #[serde(default)]
    pub peak: Option<bool>,
}

/// Response of `POST /api/predict_point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPointPrediction {
    /// Zone of the pickup point.
    pub zone_id: ZoneId,
    /// Surge probability, rounded to 3 decimal places.
    pub surge_probability: f64,
    /// Demand band.
    pub surge_label: SurgeLabel,
}

impl From<PredictionResult> for ApiPointPrediction {
    fn from(result: PredictionResult) -> Self {
        Self {
            zone_id: result.origin_zone(),
            surge_probability: round_probability(result.surge_probability),
            surge_label: result.surge_label,
        }
    }
}

/// Query parameters of `GET /api/zones/nearest`.
#[derive(Debug, Clone, Deserialize)]
pub struct NearestZoneParams {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Response of `GET /api/zones/nearest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiNearestZone {
    /// Nearest zone.
    pub zone_id: ZoneId,
    /// Centroid latitude of that zone.
    pub latitude: f64,
    /// Centroid longitude of that zone.
    pub longitude: f64,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Always `"ok"` while the server is serving.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// The place that could not be resolved, for 422 responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

impl ApiError {
    /// An error with only a message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            place: None,
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The surge prediction pipeline.
//!
//! A [`Predictor`] owns every load-once resource (zone index, model,
//! heuristic table, place resolver, optional weather provider) and runs one
//! request through them:
//!
//! 1. Resolve origin and destination concurrently (geocoding text input).
//! 2. Assign each to its nearest zone.
//! 3. Look up the weather at the origin, if a provider is configured.
//! 4. Build the feature row and score it.
//! 5. Label the probability and estimate the travel time.
//!
//! A location that cannot be resolved fails the request before the model
//! is called.

pub mod location;

use std::sync::Arc;

use chrono::NaiveDateTime;
use surge_features::{FeatureBuilder, TripContext, now_utc};
use surge_geocoder::PlaceResolver;
use surge_geography_models::{Coordinate, CoordinateError, Zone};
use surge_model::SurgeModel;
use surge_models::{PredictionResult, ResolvedLocation, SurgeLabel};
use surge_weather::{WeatherCondition, WeatherProvider};
use surge_zones::ZoneIndex;
use thiserror::Error;

pub use location::LocationQuery;

/// Errors a prediction request can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    /// The request itself is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with it.
        message: String,
    },

    /// A place name could not be geocoded.
    #[error("could not resolve location '{place}'")]
    Unresolvable {
        /// The place name as the caller supplied it.
        place: String,
    },
}

impl From<CoordinateError> for PredictError {
    fn from(e: CoordinateError) -> Self {
        Self::InvalidRequest {
            message: e.to_string(),
        }
    }
}

/// One prediction request.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    /// Trip origin.
    pub origin: LocationQuery,
    /// Trip destination.
    pub destination: LocationQuery,
    /// Trip time; current UTC time when absent.
    pub timestamp: Option<NaiveDateTime>,
    /// Peak/off-peak toggle overriding the rush hour table.
    pub peak: Option<bool>,
}

/// Load-once state shared by every request.
pub struct Predictor {
    zones: ZoneIndex,
    model: SurgeModel,
    features: FeatureBuilder,
    resolver: Arc<dyn PlaceResolver>,
    weather: Option<Arc<dyn WeatherProvider>>,
}

impl Predictor {
    /// Creates a predictor without a weather provider.
    #[must_use]
    pub fn new(
        zones: ZoneIndex,
        model: SurgeModel,
        features: FeatureBuilder,
        resolver: Arc<dyn PlaceResolver>,
    ) -> Self {
        Self {
            zones,
            model,
            features,
            resolver,
            weather: None,
        }
    }

    /// Adds a weather provider.
    #[must_use]
    pub fn with_weather(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(provider);
        self
    }

    /// The zone index.
    #[must_use]
    pub const fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    /// The feature builder and its heuristic table.
    #[must_use]
    pub const fn features(&self) -> &FeatureBuilder {
        &self.features
    }

    /// The loaded model.
    #[must_use]
    pub const fn model(&self) -> &SurgeModel {
        &self.model
    }

    /// Zone nearest to `coordinate`.
    #[must_use]
    pub fn nearest_zone(&self, coordinate: &Coordinate) -> &Zone {
        self.zones.nearest(coordinate)
    }

    /// Runs one prediction.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError::Unresolvable`] if a place name cannot be
    /// geocoded; the model is not called in that case.
    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResult, PredictError> {
        let (origin, destination) = tokio::try_join!(
            self.locate(&request.origin),
            self.locate(&request.destination)
        )?;

        let timestamp = request.timestamp.unwrap_or_else(now_utc);
        let weather = match &self.weather {
            Some(provider) => {
                surge_weather::current_or_unknown(provider.as_ref(), &origin.coordinate).await
            }
            None => WeatherCondition::Unknown,
        };

        let row = self.features.build(&TripContext {
            timestamp,
            origin_name: origin.name.as_deref(),
            destination_name: destination.name.as_deref(),
            weather,
            peak: request.peak,
        });

        let surge_probability = self.model.predict(&row);
        let surge_label =
            SurgeLabel::from_probability(surge_probability, &self.features.config().label_bands);

        let speed_kmh = self
            .features
            .rule_speed(row.is_rush_hour == 1, weather);
        let distance_km = origin.coordinate.haversine_km(&destination.coordinate);
        let eta_minutes = distance_km / speed_kmh * 60.0;

        log::debug!(
            "Predicted zone {} -> zone {} at {timestamp}: p={surge_probability:.3} ({surge_label}), \
             {distance_km:.1} km, eta {eta_minutes:.1} min, weather {weather}",
            origin.zone_id,
            destination.zone_id,
        );

        Ok(PredictionResult {
            origin,
            destination,
            surge_probability,
            surge_label,
            eta_minutes,
            features: row,
        })
    }

    async fn locate(&self, query: &LocationQuery) -> Result<ResolvedLocation, PredictError> {
        let (name, coordinate) = match query {
            LocationQuery::Coordinate(coordinate) => {
                coordinate.validate()?;
                (None, *coordinate)
            }
            LocationQuery::Place(place) => {
                let resolved = self.resolver.resolve(place).await.map_err(|e| {
                    log::info!("Rejecting request: {e}");
                    PredictError::Unresolvable {
                        place: place.clone(),
                    }
                })?;
                (Some(place.clone()), resolved.coordinate)
            }
        };

        Ok(ResolvedLocation {
            name,
            zone_id: self.zones.nearest(&coordinate).zone_id,
            coordinate,
        })
    }
}

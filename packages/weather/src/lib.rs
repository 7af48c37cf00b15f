#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coarse current-weather lookup.
//!
//! The feature builder only needs to know whether the weather at the trip
//! origin is adverse, so provider responses are reduced to a
//! [`WeatherCondition`]. Weather is optional: when `WEATHER_API_KEY` is not
//! set no provider is created, and a failing provider degrades to
//! [`WeatherCondition::Unknown`].

pub mod openweathermap;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use surge_geography_models::Coordinate;
use thiserror::Error;

/// Request timeout for weather lookups.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from weather lookups.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("weather API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error message, if any.
        message: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// Weather category relevant to traffic speed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WeatherCondition {
    /// Clear sky.
    Clear,
    /// Cloudy, no precipitation.
    Clouds,
    /// Light rain.
    Drizzle,
    /// Rain.
    Rain,
    /// Thunderstorm, squalls.
    Thunderstorm,
    /// Snow or sleet.
    Snow,
    /// Reduced visibility (fog, mist, haze, smoke, dust).
    Fog,
    /// No information.
    #[default]
    Unknown,
}

impl WeatherCondition {
    /// Returns `true` if the condition slows traffic down.
    #[must_use]
    pub const fn is_adverse(self) -> bool {
        matches!(
            self,
            Self::Drizzle | Self::Rain | Self::Thunderstorm | Self::Snow | Self::Fog
        )
    }
}

/// Source of current weather for a coordinate.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Returns the current weather at `coordinate`.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] if the lookup fails.
    async fn current(&self, coordinate: &Coordinate) -> Result<WeatherCondition, WeatherError>;
}

/// Looks up the current weather, falling back to
/// [`WeatherCondition::Unknown`] on any failure.
pub async fn current_or_unknown(
    provider: &dyn WeatherProvider,
    coordinate: &Coordinate,
) -> WeatherCondition {
    match provider.current(coordinate).await {
        Ok(condition) => condition,
        Err(e) => {
            log::warn!(
                "Weather lookup for ({}, {}) failed, assuming unknown: {e}",
                coordinate.latitude,
                coordinate.longitude
            );
            WeatherCondition::Unknown
        }
    }
}

/// Creates the weather provider from environment variables.
///
/// Returns `Ok(None)` when `WEATHER_API_KEY` is not set.
///
/// # Errors
///
/// Returns [`WeatherError::Http`] if the HTTP client cannot be built.
pub fn create_provider_from_env() -> Result<Option<Arc<dyn WeatherProvider>>, WeatherError> {
    let Some(api_key) = std::env::var("WEATHER_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
    else {
        log::info!("WEATHER_API_KEY not set; weather adjustments disabled");
        return Ok(None);
    };

    log::info!("Weather: OpenWeatherMap (timeout {DEFAULT_TIMEOUT:?})");
    let provider = openweathermap::OpenWeatherMapProvider::new(api_key, DEFAULT_TIMEOUT)?;
    Ok(Some(Arc::new(provider)))
}

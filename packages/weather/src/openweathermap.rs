//! `OpenWeatherMap` current-weather client.
//!
//! See <https://openweathermap.org/current>

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use surge_geography_models::Coordinate;

use crate::{WeatherCondition, WeatherError, WeatherProvider};

/// Current-weather endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    weather: Vec<WeatherEntry>,
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    main: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// `OpenWeatherMap` provider.
pub struct OpenWeatherMapProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherMapProvider {
    /// Creates a provider against [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, WeatherError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key, timeout)
    }

    /// Creates a provider against a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    async fn current(&self, coordinate: &Coordinate) -> Result<WeatherCondition, WeatherError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_default();
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(body)
    }
}

fn parse_response(body: serde_json::Value) -> Result<WeatherCondition, WeatherError> {
    let current: CurrentWeather =
        serde_json::from_value(body).map_err(|e| WeatherError::Parse {
            message: format!("Unexpected weather response: {e}"),
        })?;

    Ok(current
        .weather
        .first()
        .map_or(WeatherCondition::Unknown, |w| condition_from_main(&w.main)))
}

/// Maps `OpenWeatherMap`'s `weather[].main` group onto a
/// [`WeatherCondition`].
#[must_use]
pub fn condition_from_main(main: &str) -> WeatherCondition {
    match main.trim().to_ascii_lowercase().as_str() {
        "clear" => WeatherCondition::Clear,
        "clouds" => WeatherCondition::Clouds,
        "drizzle" => WeatherCondition::Drizzle,
        "rain" => WeatherCondition::Rain,
        "thunderstorm" | "squall" | "tornado" => WeatherCondition::Thunderstorm,
        "snow" => WeatherCondition::Snow,
        "mist" | "fog" | "haze" | "smoke" | "dust" | "sand" | "ash" => WeatherCondition::Fog,
        _ => WeatherCondition::Unknown,
    }
}

//! Nominatim / `OpenStreetMap` geocoder client.
//!
//! The public instance requires a descriptive `User-Agent` and allows at
//! most one request per second. Responses are a JSON array of matches with
//! string-typed `lat`/`lon`.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use crate::{GeocodeError, GeocodedPlace, GeocodingProvider};
use surge_geography_models::Coordinate;

/// Geocodes a free-form place name using the Nominatim search endpoint.
///
/// Returns `Ok(None)` when Nominatim has no match.
///
/// # Errors
///
/// Returns [`GeocodeError::Transient`] for HTTP 429 and 5xx,
/// [`GeocodeError::Provider`] for other non-success statuses, and
/// [`GeocodeError::Http`] / [`GeocodeError::Parse`] for transport and
/// decoding failures.
pub async fn geocode_freeform(
    client: &reqwest::Client,
    base_url: &str,
    user_agent: &str,
    query: &str,
) -> Result<Option<GeocodedPlace>, GeocodeError> {
    let resp = client
        .get(base_url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .query(&[("q", query), ("format", "json"), ("limit", "1")])
        .send()
        .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(GeocodeError::Transient {
            message: format!("Nominatim returned HTTP {status}"),
        });
    }
    if !status.is_success() {
        return Err(GeocodeError::Provider {
            status: status.to_string(),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses a Nominatim JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedPlace>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = parse_degrees(&first["lat"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in Nominatim response".to_string(),
    })?;

    let lon = parse_degrees(&first["lon"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lon in Nominatim response".to_string(),
    })?;

    let coordinate = Coordinate::new(lat, lon).map_err(|e| GeocodeError::Parse {
        message: format!("Nominatim returned an invalid coordinate: {e}"),
    })?;

    Ok(Some(GeocodedPlace {
        coordinate,
        display_name: first["display_name"].as_str().map(String::from),
        provider: GeocodingProvider::Nominatim,
    }))
}

/// Nominatim sends coordinates as strings; accept plain numbers too.
fn parse_degrees(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
}

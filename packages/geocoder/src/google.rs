//! Google Maps Geocoding API client.
//!
//! Key-authenticated; the key is supplied by the caller (read from the
//! environment by [`crate::ResolverSettings::from_env`]).
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use serde::Deserialize;
use surge_geography_models::Coordinate;

use crate::{GeocodeError, GeocodedPlace, GeocodingProvider};

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Geocodes a free-form address with the Google Geocoding API.
///
/// Returns `Ok(None)` for `ZERO_RESULTS`.
///
/// # Errors
///
/// Returns [`GeocodeError::Transient`] for `OVER_QUERY_LIMIT`,
/// `UNKNOWN_ERROR` and HTTP 5xx, [`GeocodeError::Provider`] for any other
/// non-`OK` status, and [`GeocodeError::Http`] for transport failures.
pub async fn geocode(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    query: &str,
) -> Result<Option<GeocodedPlace>, GeocodeError> {
    let resp = client
        .get(base_url)
        .query(&[("address", query), ("key", api_key)])
        .send()
        .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(GeocodeError::Transient {
            message: format!("Google geocoder returned HTTP {status}"),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(body)
}

fn parse_response(body: serde_json::Value) -> Result<Option<GeocodedPlace>, GeocodeError> {
    let response: GeocodeResponse =
        serde_json::from_value(body).map_err(|e| GeocodeError::Parse {
            message: format!("Unexpected Google geocoder response: {e}"),
        })?;

    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => {
            return Err(GeocodeError::Transient {
                message: response.status,
            });
        }
        _ => {
            if let Some(message) = &response.error_message {
                log::error!("Google geocoder: {} ({message})", response.status);
            }
            return Err(GeocodeError::Provider {
                status: response.status,
            });
        }
    }

    let Some(first) = response.results.into_iter().next() else {
        return Ok(None);
    };

    let location = first.geometry.location;
    let coordinate = Coordinate::new(location.lat, location.lng).map_err(|e| {
        GeocodeError::Parse {
            message: format!("Google geocoder returned an invalid coordinate: {e}"),
        }
    })?;

    Ok(Some(GeocodedPlace {
        coordinate,
        display_name: first.formatted_address,
        provider: GeocodingProvider::Google,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_response() {
        let body = serde_json::json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Manhattan, NY 10036, USA",
                "geometry": { "location": { "lat": 40.758, "lng": -73.9855 } }
            }]
        });
        let place = parse_response(body).unwrap().unwrap();
        assert_eq!(place.provider, GeocodingProvider::Google);
        assert!((place.coordinate.latitude - 40.758).abs() < 1e-9);
        assert!((place.coordinate.longitude - -73.9855).abs() < 1e-9);
        assert_eq!(place.display_name.as_deref(), Some("Manhattan, NY 10036, USA"));
    }

    #[test]
    fn zero_results_is_no_match() {
        let body = serde_json::json!({ "status": "ZERO_RESULTS", "results": [] });
        assert!(parse_response(body).unwrap().is_none());
    }

    #[test]
    fn denied_is_provider_error() {
        let body = serde_json::json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        });
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, GeocodeError::Provider { ref status } if status == "REQUEST_DENIED"));
        assert!(!err.is_transient());
    }

    #[test]
    fn quota_is_transient() {
        let body = serde_json::json!({ "status": "OVER_QUERY_LIMIT" });
        assert!(parse_response(body).unwrap_err().is_transient());
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let body = serde_json::json!({ "results": "nope" });
        assert!(matches!(
            parse_response(body),
            Err(GeocodeError::Parse { .. })
        ));
    }
}

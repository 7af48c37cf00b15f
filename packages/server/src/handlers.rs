//! HTTP handler functions for the surge predictor API.

use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use surge_features::parse_timestamp;
use surge_geography_models::Coordinate;
use surge_predictor::{LocationQuery, PredictError, PredictionRequest};
use surge_server_models::{
    ApiError, ApiHealth, ApiLocation, ApiNearestZone, ApiPointPrediction, ApiPointRequest,
    ApiPredictForm, ApiPredictRequest, ApiPrediction, NearestZoneParams, parse_toggle,
};

use crate::AppState;

const UI_HTML: &str = include_str!("../ui/index.html");

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/predict_surge` with a JSON body.
///
/// Responds 400 for malformed input and 422 naming the place when a
/// location cannot be geocoded.
pub async fn predict_surge_json(
    state: web::Data<AppState>,
    body: web::Json<ApiPredictRequest>,
) -> HttpResponse {
    match from_json(body.into_inner()) {
        Ok(request) => predict(&state, &request).await,
        Err(e) => error_response(&e),
    }
}

/// `POST /api/predict_surge` with an `application/x-www-form-urlencoded`
/// body, as the form page submits it.
pub async fn predict_surge_form(
    state: web::Data<AppState>,
    form: web::Form<ApiPredictForm>,
) -> HttpResponse {
    match from_form(form.into_inner()) {
        Ok(request) => predict(&state, &request).await,
        Err(e) => error_response(&e),
    }
}

/// `POST /api/predict_point`
///
/// Surge at a single pickup coordinate: the trip starts and ends at the
/// point, so only its zone and the clock drive the features.
pub async fn predict_point(
    state: web::Data<AppState>,
    body: web::Json<ApiPointRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    let request = LocationQuery::from_coordinate(body.latitude, body.longitude).and_then(|point| {
        Ok(PredictionRequest {
            origin: point.clone(),
            destination: point,
            timestamp: timestamp(body.timestamp.as_deref())?,
            peak: body.peak,
        })
    });
    let request = match request {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    match state.predictor.predict(&request).await {
        Ok(result) => HttpResponse::Ok().json(ApiPointPrediction::from(result)),
        Err(e) => error_response(&e),
    }
}

async fn predict(state: &AppState, request: &PredictionRequest) -> HttpResponse {
    match state.predictor.predict(request).await {
        Ok(result) => HttpResponse::Ok().json(ApiPrediction::from(result)),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/zones/nearest?lat=..&lon=..`
pub async fn nearest_zone(
    state: web::Data<AppState>,
    params: web::Query<NearestZoneParams>,
) -> HttpResponse {
    let coordinate = match Coordinate::new(params.lat, params.lon) {
        Ok(c) => c,
        Err(e) => return HttpResponse::BadRequest().json(ApiError::new(e.to_string())),
    };

    let zone = state.predictor.nearest_zone(&coordinate);
    HttpResponse::Ok().json(ApiNearestZone {
        zone_id: zone.zone_id,
        latitude: zone.latitude,
        longitude: zone.longitude,
    })
}

/// `GET /` and `GET /ui`
pub async fn ui() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(UI_HTML)
}

fn from_json(body: ApiPredictRequest) -> Result<PredictionRequest, PredictError> {
    Ok(PredictionRequest {
        origin: location(body.origin)?,
        destination: location(body.destination)?,
        timestamp: timestamp(body.timestamp.as_deref())?,
        peak: body.peak,
    })
}

fn from_form(form: ApiPredictForm) -> Result<PredictionRequest, PredictError> {
    let peak = parse_toggle(form.peak.as_deref()).map_err(|value| PredictError::InvalidRequest {
        message: format!("invalid peak value '{value}' (expected true or false)"),
    })?;

    Ok(PredictionRequest {
        origin: LocationQuery::parse(&form.origin)?,
        destination: LocationQuery::parse(&form.destination)?,
        timestamp: timestamp(form.timestamp.as_deref())?,
        peak,
    })
}

fn location(location: ApiLocation) -> Result<LocationQuery, PredictError> {
    match location {
        ApiLocation::Coordinates {
            latitude,
            longitude,
        } => LocationQuery::from_coordinate(latitude, longitude),
        ApiLocation::Text(text) => LocationQuery::parse(&text),
    }
}

/// Absent or blank means "now".
fn timestamp(value: Option<&str>) -> Result<Option<NaiveDateTime>, PredictError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .map_err(|e| PredictError::InvalidRequest {
                message: e.to_string(),
            }),
    }
}

fn error_response(error: &PredictError) -> HttpResponse {
    match error {
        PredictError::InvalidRequest { message } => {
            HttpResponse::BadRequest().json(ApiError::new(message.clone()))
        }
        PredictError::Unresolvable { place } => {
            HttpResponse::UnprocessableEntity().json(ApiError {
                error: error.to_string(),
                place: Some(place.clone()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use async_trait::async_trait;
    use surge_features::FeatureBuilder;
    use surge_geocoder::{GeocodeError, GeocodedPlace, GeocodingProvider, PlaceResolver};
    use surge_geography_models::Zone;
    use surge_model::{SurgeClassifier, SurgeModel};
    use surge_models::FEATURE_COUNT;
    use surge_predictor::Predictor;
    use surge_zones::ZoneIndex;

    use super::*;

    struct FakeResolver(BTreeMap<&'static str, Coordinate>);

    #[async_trait]
    impl PlaceResolver for FakeResolver {
        async fn resolve(&self, place: &str) -> Result<GeocodedPlace, GeocodeError> {
            self.0
                .get(place)
                .map(|coordinate| GeocodedPlace {
                    coordinate: *coordinate,
                    display_name: None,
                    provider: GeocodingProvider::Nominatim,
                })
                .ok_or_else(|| GeocodeError::Unresolvable {
                    place: place.to_string(),
                })
        }
    }

    struct Constant(f64);

    impl SurgeClassifier for Constant {
        fn predict_proba(&self, _: &[f64; FEATURE_COUNT]) -> f64 {
            self.0
        }
    }

    fn state() -> web::Data<AppState> {
        let zones = ZoneIndex::new(vec![
            Zone {
                zone_id: 230,
                latitude: 40.7580,
                longitude: -73.9855,
            },
            Zone {
                zone_id: 132,
                latitude: 40.6413,
                longitude: -73.7781,
            },
        ])
        .unwrap();
        let resolver = FakeResolver(BTreeMap::from([
            (
                "JFK Airport",
                Coordinate {
                    latitude: 40.6413,
                    longitude: -73.7781,
                },
            ),
            (
                "Times Square",
                Coordinate {
                    latitude: 40.7580,
                    longitude: -73.9855,
                },
            ),
        ]));
        let predictor = Predictor::new(
            zones,
            SurgeModel::new(Arc::new(Constant(0.8))),
            FeatureBuilder::default(),
            Arc::new(resolver),
        );
        web::Data::new(AppState {
            predictor: Arc::new(predictor),
        })
    }

    macro_rules! app {
        () => {
            test::init_service(App::new().app_data(state()).configure(crate::configure)).await
        };
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let app = app!();
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: ApiHealth = test::read_body_json(resp).await;
        assert_eq!(body.status, "ok");
    }

    #[actix_web::test]
    async fn predicts_from_json_coordinates() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({
                "origin": { "latitude": 40.7589, "longitude": -73.9851 },
                "destination": "40.6400,-73.7800",
                "timestamp": "2024-06-15T08:30:00"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: ApiPrediction = test::read_body_json(resp).await;
        assert_eq!((body.origin_zone, body.destination_zone), (230, 132));
        assert!((body.surge_probability - 0.8).abs() < 1e-9);
        assert_eq!(body.features.dayofweek, 5);
        assert_eq!(body.features.is_weekend, 1);
        assert!(body.eta_minutes > 0.0);
    }

    #[actix_web::test]
    async fn accepts_area_aliases() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({
                "from_area": "JFK Airport",
                "to_area": "Times Square",
                "peak": true
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["surge_label"], "VERY BUSY");
        assert_eq!(body["origin"]["name"], "JFK Airport");
        assert_eq!(body["features"]["is_rush_hour"], 1);
    }

    #[actix_web::test]
    async fn predicts_from_form() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_form([
                ("origin", "Times Square"),
                ("destination", "JFK Airport"),
                ("timestamp", "2024-06-17T03:00"),
                ("peak", "off"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: ApiPrediction = test::read_body_json(resp).await;
        assert_eq!((body.origin_zone, body.destination_zone), (230, 132));
        assert_eq!(body.features.hour, 3);
        assert_eq!(body.features.is_rush_hour, 0);
    }

    #[actix_web::test]
    async fn missing_field_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({ "origin": "JFK Airport" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert!(!body.error.is_empty());
    }

    #[actix_web::test]
    async fn out_of_range_coordinate_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({
                "origin": { "latitude": 95.0, "longitude": -73.9851 },
                "destination": "JFK Airport"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn bad_timestamp_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({
                "origin": "JFK Airport",
                "destination": "Times Square",
                "timestamp": "next tuesday"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert!(body.error.contains("next tuesday"));
    }

    #[actix_web::test]
    async fn unresolvable_place_is_unprocessable() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_json(serde_json::json!({
                "origin": "Atlantis",
                "destination": "Times Square"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.place.as_deref(), Some("Atlantis"));
    }

    #[actix_web::test]
    async fn nearest_zone_lookup() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/zones/nearest?lat=40.6400&lon=-73.7800")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: ApiNearestZone = test::read_body_json(resp).await;
        assert_eq!(body.zone_id, 132);

        let req = test::TestRequest::get()
            .uri("/api/zones/nearest?lat=40.6&lon=-200")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/zones/nearest?lat=north")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn serves_form_page() {
        let app = app!();
        for uri in ["/", "/ui"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request())
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body = test::read_body(resp).await;
            let html = std::str::from_utf8(&body).unwrap();
            assert!(html.contains("<form"));
            assert!(html.contains("/api/predict_surge"));
        }
    }

    #[actix_web::test]
    async fn malformed_form_reports_form_error() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_form([("origin", "Times Square")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert!(body.error.starts_with("invalid form body"), "{}", body.error);
        assert!(body.error.contains("destination"), "{}", body.error);
    }

    #[actix_web::test]
    async fn bad_form_toggle_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_surge")
            .set_form([
                ("origin", "Times Square"),
                ("destination", "JFK Airport"),
                ("peak", "sometimes"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert!(body.error.contains("sometimes"));
    }

    #[actix_web::test]
    async fn predicts_at_a_single_point() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_point")
            .set_json(serde_json::json!({
                "latitude": 40.7589,
                "longitude": -73.9851,
                "timestamp": "2024-06-15T08:30:00"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({
                "zone_id": 230,
                "surge_probability": 0.8,
                "surge_label": "VERY BUSY"
            })
        );
    }

    #[actix_web::test]
    async fn point_prediction_validates_input() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/predict_point")
            .set_json(serde_json::json!({ "latitude": 91.0, "longitude": -73.9851 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/predict_point")
            .set_json(serde_json::json!({ "latitude": 40.7589 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/predict_point")
            .set_json(serde_json::json!({
                "latitude": 40.7589,
                "longitude": -73.9851,
                "timestamp": "yesterday"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the surge predictor.
//!
//! Serves the prediction API, a nearest-zone lookup, a health check and
//! the single-page form. Every load-once resource is built by
//! [`build_predictor`] before the server binds; any failure there stops
//! startup.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{App, HttpResponse, HttpServer, error, guard, middleware, web};
use surge_features::{DemandHeuristicConfig, FeatureBuilder, HeuristicConfigError};
use surge_geocoder::{GeocodeError, ResolverSettings, build_resolver};
use surge_model::{ModelError, SurgeModel};
use surge_predictor::Predictor;
use surge_server_models::ApiError;
use surge_weather::WeatherError;
use surge_zones::{ZoneIndex, ZoneIndexError};
use thiserror::Error;

/// Default zone table location.
pub const DEFAULT_ZONES_PATH: &str = "data/zone_centroids.csv";

/// Default model artifact location.
pub const DEFAULT_MODEL_PATH: &str = "data/lightgbm_surge_model.json";

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An environment variable has an invalid value.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },

    /// The zone table could not be loaded.
    #[error(transparent)]
    Zones(#[from] ZoneIndexError),

    /// The model could not be loaded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The heuristic table override could not be loaded.
    #[error(transparent)]
    Heuristics(#[from] HeuristicConfigError),

    /// The geocoder could not be configured.
    #[error(transparent)]
    Geocoder(#[from] GeocodeError),

    /// The weather provider could not be configured.
    #[error(transparent)]
    Weather(#[from] WeatherError),

    /// Binding or running the HTTP server failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Zone centroid CSV.
    pub zones_path: PathBuf,
    /// LightGBM model dump.
    pub model_path: PathBuf,
    /// Heuristic table override; the embedded `v1` table when `None`.
    pub heuristics_path: Option<PathBuf>,
    /// Geocoder settings.
    pub resolver: ResolverSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            zones_path: PathBuf::from(DEFAULT_ZONES_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            heuristics_path: None,
            resolver: ResolverSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from `BIND_ADDR`, `PORT`,
    /// `SURGE_ZONES_PATH`, `SURGE_MODEL_PATH`, `SURGE_HEURISTICS_PATH` and
    /// the geocoder variables (see [`ResolverSettings::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if `PORT` is not a port number and
    /// [`ServerError::Geocoder`] if a geocoder variable is invalid.
    pub fn from_env() -> Result<Self, ServerError> {
        let defaults = Self::default();
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ServerError::Config {
                message: format!("PORT must be a port number, got '{p}'"),
            })?,
            None => defaults.port,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port,
            zones_path: var("SURGE_ZONES_PATH").map_or(defaults.zones_path, PathBuf::from),
            model_path: var("SURGE_MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
            heuristics_path: var("SURGE_HEURISTICS_PATH").map(PathBuf::from),
            resolver: ResolverSettings::from_env()?,
        })
    }
}

/// Shared application state.
pub struct AppState {
    /// The prediction pipeline and its load-once resources.
    pub predictor: Arc<Predictor>,
}

/// Loads the zone table, model and heuristic table, and configures the
/// geocoder and (if `WEATHER_API_KEY` is set) the weather provider.
///
/// # Errors
///
/// Returns [`ServerError`] if any resource fails to load.
pub fn build_predictor(config: &ServerConfig) -> Result<Predictor, ServerError> {
    log::info!("Loading zones from {}...", config.zones_path.display());
    let zones = ZoneIndex::load_csv(&config.zones_path)?;

    log::info!("Loading model from {}...", config.model_path.display());
    let model = SurgeModel::load(&config.model_path)?;

    let heuristics = DemandHeuristicConfig::load_or_default(config.heuristics_path.as_deref())?;
    log::info!(
        "Heuristic table {}: counts {}, speed {}, travel time {}",
        heuristics.version,
        heuristics.counts.mode,
        heuristics.speed.mode,
        heuristics.travel_time.mode
    );

    let resolver = build_resolver(&config.resolver)?;
    let predictor = Predictor::new(zones, model, FeatureBuilder::new(heuristics), resolver);

    Ok(match surge_weather::create_provider_from_env()? {
        Some(weather) => predictor.with_weather(weather),
        None => predictor,
    })
}

/// Registers the API routes, the form page and the extractor error
/// handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        bad_request(format!("invalid request body: {err}"), err)
    }))
    .app_data(web::FormConfig::default().error_handler(|err, _req| {
        bad_request(format!("invalid form body: {err}"), err)
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        bad_request(format!("invalid query: {err}"), err)
    }))
    .service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .service(
                web::resource("/predict_surge")
                    .route(
                        web::post()
                            .guard(guard::fn_guard(is_form_body))
                            .to(handlers::predict_surge_form),
                    )
                    .route(web::post().to(handlers::predict_surge_json)),
            )
            .route("/predict_point", web::post().to(handlers::predict_point))
            .route("/zones/nearest", web::get().to(handlers::nearest_zone)),
    )
    .route("/", web::get().to(handlers::ui))
    .route("/ui", web::get().to(handlers::ui));
}

fn is_form_body(ctx: &guard::GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

fn bad_request<E>(message: String, err: E) -> actix_web::Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    log::debug!("{message}");
    error::InternalError::from_response(err, HttpResponse::BadRequest().json(ApiError::new(message)))
        .into()
}

/// Builds the predictor and serves until shut down. The caller provides
/// the runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if a resource fails to load or the server
/// cannot bind.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let predictor = build_predictor(&config)?;
    let state = web::Data::new(AppState {
        predictor: Arc::new(predictor),
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

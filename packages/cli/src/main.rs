#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the surge predictor.
//!
//! Every subcommand reads the same environment configuration as the
//! server (see [`ServerConfig::from_env`]); flags override it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use surge_features::parse_timestamp;
use surge_geography_models::Coordinate;
use surge_model::GbdtModel;
use surge_predictor::{LocationQuery, PredictionRequest};
use surge_server::{ServerConfig, build_predictor, run_server};
use surge_server_models::{ApiNearestZone, ApiPrediction};
use surge_zones::ZoneIndex;

#[derive(Parser)]
#[command(name = "surge", about = "Ride-hailing surge predictor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides `BIND_ADDR`)
        #[arg(long)]
        bind_addr: Option<String>,
        /// Port to bind (overrides `PORT`)
        #[arg(long)]
        port: Option<u16>,
        /// Zone centroid CSV (overrides `SURGE_ZONES_PATH`)
        #[arg(long)]
        zones: Option<PathBuf>,
        /// LightGBM model dump (overrides `SURGE_MODEL_PATH`)
        #[arg(long)]
        model: Option<PathBuf>,
        /// Heuristic table override (overrides `SURGE_HEURISTICS_PATH`)
        #[arg(long)]
        heuristics: Option<PathBuf>,
    },
    /// Predict surge for a single trip and print the result as JSON
    Predict {
        /// Place name or "lat,lon"
        #[arg(long)]
        origin: String,
        /// Place name or "lat,lon"
        #[arg(long)]
        destination: String,
        /// Trip time (RFC 3339 or `YYYY-MM-DDTHH:MM:SS`); now when omitted
        #[arg(long)]
        timestamp: Option<String>,
        /// Force peak (`true`) or off-peak (`false`) traffic
        #[arg(long)]
        peak: Option<bool>,
    },
    /// Print the zone nearest to a coordinate
    NearestZone {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Print the objective, tree count and feature names of a model dump
    InspectModel {
        /// Model path (defaults to `SURGE_MODEL_PATH`)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;

    match cli.command {
        Commands::Serve {
            bind_addr,
            port,
            zones,
            model,
            heuristics,
        } => {
            if let Some(bind_addr) = bind_addr {
                config.bind_addr = bind_addr;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(zones) = zones {
                config.zones_path = zones;
            }
            if let Some(model) = model {
                config.model_path = model;
            }
            if heuristics.is_some() {
                config.heuristics_path = heuristics;
            }
            run_server(config).await?;
        }
        Commands::Predict {
            origin,
            destination,
            timestamp,
            peak,
        } => {
            let predictor = build_predictor(&config)?;
            let request = PredictionRequest {
                origin: LocationQuery::parse(&origin)?,
                destination: LocationQuery::parse(&destination)?,
                timestamp: timestamp.as_deref().map(parse_timestamp).transpose()?,
                peak,
            };
            let result = predictor.predict(&request).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ApiPrediction::from(result))?
            );
        }
        Commands::NearestZone { lat, lon } => {
            let coordinate = Coordinate::new(lat, lon)?;
            let zones = ZoneIndex::load_csv(&config.zones_path)?;
            let zone = zones.nearest(&coordinate);
            println!(
                "{}",
                serde_json::to_string_pretty(&ApiNearestZone {
                    zone_id: zone.zone_id,
                    latitude: zone.latitude,
                    longitude: zone.longitude,
                })?
            );
        }
        Commands::InspectModel { path } => {
            let path = path.unwrap_or(config.model_path);
            let model = GbdtModel::load(&path)?;
            println!("Model:      {}", path.display());
            println!("Objective:  {}", model.objective());
            println!("Trees:      {}", model.tree_count());
            println!("Features:");
            for (i, name) in model.feature_names().iter().enumerate() {
                println!("  {i:>2}  {name}");
            }
        }
    }

    Ok(())
}

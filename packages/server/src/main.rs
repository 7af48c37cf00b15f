#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Surge predictor API server binary.

use surge_server::{ServerConfig, run_server};

#[actix_web::main]
async fn main() {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let result = match ServerConfig::from_env() {
        Ok(config) => run_server(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        log::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

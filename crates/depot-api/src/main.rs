//! # depot — Binary Entry Point
//!
//! Parses flags and environment, opens the storage root and starts the
//! Axum HTTP server.

use clap::Parser;
use depot_api::config::{AppConfig, ServerArgs};
use depot_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_args(ServerArgs::parse())?;

    depot_api::telemetry::init(config.log_format, config.debug);
    tracing::debug!(?config, "configuration loaded");

    let listen = config.listen;
    let state = AppState::new(config).map_err(|e| {
        tracing::error!("Failed to open storage root: {e}");
        e
    })?;
    let root = state.store.root().display().to_string();

    let app = depot_api::app(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(%listen, %root, "depot listening");
    axum::serve(listener, app).await?;

    Ok(())
}

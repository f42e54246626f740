//! Pricefeed Server
//!
//! A catalog service whose price changes flow through an event log and a
//! relay into a fanout broker, where each instance's subscriber keeps the
//! latest known prices.

mod api;
mod config;
mod pipeline;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use pipeline::Pipeline;
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Pricefeed - catalog with reliable price-change propagation
#[derive(Parser, Debug)]
#[command(name = "pricefeed-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./pricefeed.toml", env = "PRICEFEED_CONFIG")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting pricefeed-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    let listen_addr = loaded_config.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let pipeline = Pipeline::start(&loaded_config).await.map_err(|e| {
        tracing::error!("Failed to start pipeline: {}", e);
        e
    })?;

    let state = AppState::new(pipeline.catalog.clone(), pipeline.prices.clone());
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    tracing::info!("Stopping relay and subscriber...");
    pipeline.shutdown().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pricefeed_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

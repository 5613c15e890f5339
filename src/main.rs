//! lxcgate entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;

use lxcgate::allocator::Allocator;
use lxcgate::config::Config;
use lxcgate::http;
use lxcgate::orchestrator::{Orchestrator, Settings};
use lxcgate::store::SqliteStore;
use lxcgate::upstream::PveGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting lxcgate with config: {:?}", cfg);

    // Upstream session. Nothing is served without it.
    let gateway = PveGateway::connect(&cfg).await?;

    // Local state mirror
    let store = SqliteStore::open(&cfg.database)?;

    let allocator = Allocator::new(cfg.gateway, cfg.ipv6_gateway, cfg.password_policy());
    let orchestrator = Orchestrator::new(
        Arc::new(gateway),
        Arc::new(store),
        allocator,
        Settings::from_config(&cfg),
    );

    http::serve(cfg.bind, Arc::new(orchestrator), shutdown_signal()).await?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}

//! Gateway binary.
//!
//! Config loading proper (validation, env overlay) lives outside the
//! core; this entry point only reads a JSON file into the already-parsed
//! shape the core consumes. Exit codes: 0 on a clean shutdown, 1 on any
//! startup failure.

use modelmux_core::GatewayConfig;
use modelmux_server::{bind, CoreContext};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<GatewayConfig, String> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MODELMUX_CONFIG").ok());
    let Some(path) = path else {
        // No file: defaults with no providers still serve health/metrics.
        return Ok(GatewayConfig::default());
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|error| format!("cannot read config '{path}': {error}"))?;
    serde_json::from_str(&raw).map_err(|error| format!("invalid config '{path}': {error}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "startup failed");
            return ExitCode::from(1);
        }
    };

    let ctx = CoreContext::new(config);
    if let Err(error) = ctx.spawn_workers() {
        tracing::error!(error = %error, "worker startup failed");
        return ExitCode::from(1);
    }

    let (_address, server) = match bind(std::sync::Arc::clone(&ctx)).await {
        Ok(bound) => bound,
        Err(error) => {
            tracing::error!(error = %error, "bind failed");
            return ExitCode::from(1);
        }
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => tracing::error!(error = %error, "signal listener failed"),
    }

    server.abort();
    let leaked = ctx.shutdown().await;
    if leaked > 0 {
        tracing::warn!(leaked, "workers leaked during shutdown");
    }
    ExitCode::SUCCESS
}

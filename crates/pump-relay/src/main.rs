//! PumpLink relay server entry point.
//!
//! Loads the TOML configuration, binds the listening socket, and runs the
//! broker until interrupted. Socket setup failures are fatal; everything
//! after a successful bind is handled inside the broker loop.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pump_relay::infrastructure::config::RelayConfig;
use pump_relay::infrastructure::server::RelayServer;

#[derive(Debug, Parser)]
#[command(name = "pump-relay", about = "PumpLink relay server")]
struct Args {
    /// Path to the relay configuration file.
    #[arg(long, env = "PUMP_RELAY_CONFIG", default_value = "relay.toml")]
    config: PathBuf,

    /// Log filter override (e.g. "debug", "pump_relay=trace").
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("PumpLink relay starting");

    let cfg = RelayConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    let server = RelayServer::bind(cfg).await.context("starting relay server")?;

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for shutdown signal")?;
            info!("shutdown signal received");
        }
    }

    info!("PumpLink relay stopped");
    Ok(())
}

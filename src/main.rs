//! Signer relay - document hand-off between a browser and a local signer

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signer_relay::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("signer_relay={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Signer Relay");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Max payload: {} bytes", args.max_payload_bytes);
    info!(
        "Session TTL: {}s, pre-stage TTL: {}s, grace window: {}s",
        args.session_ttl_secs, args.prestage_ttl_secs, args.grace_window_secs
    );
    info!(
        "Sweep every {}s, pre-stage pass every {}s",
        args.sweep_interval_secs, args.prestage_sweep_interval_secs
    );
    match &args.storage_dir {
        Some(dir) => info!("Storage: {}", dir.display()),
        None => info!("Storage: memory"),
    }
    if let Some(url) = &args.public_url {
        info!("Public URL: {}", url);
    }
    info!("======================================");

    let state = Arc::new(AppState::new(args).await?);

    server::run(state).await?;

    Ok(())
}

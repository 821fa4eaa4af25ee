//! Landscape - Digital Landscape backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use landscape::config::{Args, LogFormat};
use landscape::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("landscape={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Digital Landscape backend v{}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage: {:?}", args.storage.storage_backend);
    info!("GitHub org: {}", args.github.github_org);
    info!("Max body: {} bytes", args.max_body_bytes);
    info!("======================================");

    let audit_path = args.audit_log_path.clone();
    let state = match AppState::new(args) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialise: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = audit_path {
        if let Err(e) = state.audit.init_file(path).await {
            warn!("Audit file unavailable, logging audit events to tracing only: {}", e);
        }
    }

    server::run(Arc::new(state)).await?;
    Ok(())
}

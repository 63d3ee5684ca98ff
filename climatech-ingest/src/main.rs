//! climatech-ingest - HLS/NDVI acquisition service
//!
//! Serves the place, NDVI and wildfire endpoints over one SQLite store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use climatech_common::config::{
    resolve_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use climatech_ingest::config::{resolve_appeears_credentials, resolve_firms_map_key};
use climatech_ingest::services::{AppeearsClient, FirmsClient};
use climatech_ingest::AppState;

/// Command-line arguments for climatech-ingest
#[derive(Parser, Debug)]
#[command(name = "climatech-ingest")]
#[command(about = "HLS imagery and wildfire acquisition service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and download scratch space
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the TOML bind_address)
    #[arg(short, long, env = "CLIMATECH_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = config_path
        .as_deref()
        .map(TomlConfig::load_or_default)
        .unwrap_or_default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting climatech-ingest v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let root_folder = RootFolderResolver::new("climatech-ingest")
        .with_cli_arg(args.root_folder)
        .with_toml_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = climatech_ingest::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let mut state = AppState::new(db, config.clone(), initializer.downloads_path());

    match resolve_appeears_credentials(&config) {
        Ok((username, password)) => {
            let client = AppeearsClient::new(&config.appeears, username, password)
                .context("Failed to build AppEEARS client")?;
            state = state.with_imagery(Arc::new(client));
        }
        Err(e) => warn!("NDVI acquisition disabled: {}", e),
    }

    match resolve_firms_map_key(&config) {
        Ok(map_key) => {
            let client = FirmsClient::new(&config.firms, map_key)
                .context("Failed to build FIRMS client")?;
            state = state.with_hotspots(Arc::new(client));
        }
        Err(e) => warn!("Wildfire feed disabled: {}", e),
    }

    let shutdown = state.shutdown.clone();
    let app = climatech_ingest::build_router(state);

    let bind_address = args.bind.unwrap_or_else(|| config.bind_address());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

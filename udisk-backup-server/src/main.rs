mod config;
mod error;
mod routes;
mod state;
mod ws;

use crate::config::{AppConfig, CliOverrides, EnvConfig};
use crate::state::AppState;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use udisk_backup::daemon::ShutdownCoordinator;
use udisk_backup::utils;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (overrides UDISK_BACKUP_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PORT and config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (overrides LOG_LEVEL and config)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::resolve(
        CliOverrides {
            config_path: args.config,
            port: args.port,
            log_level: args.log_level,
        },
        EnvConfig::from_env(),
    )?;

    // Initialize logging
    utils::logger::init(&config.log_level)?;
    tracing::info!(
        "Starting udisk-backup-server v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );

    // Build application state
    let state = Arc::new(AppState::new(config.clone()));
    tracing::info!(
        source = %config.core.backup.source_path.display(),
        marker = %state.resolver.marker_label(),
        "Backup settings loaded"
    );

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown: cancel any running transfer before the server stops
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let mut shutdown_rx = coordinator.subscribe();
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        signal_coordinator.wait_for_signal().await;
    });

    let supervisor = state.supervisor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            coordinator.shutdown(&supervisor).await;
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

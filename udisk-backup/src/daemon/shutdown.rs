//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! An in-flight transfer is cancelled before the process exits so the child
//! rsync does not outlive us and the flight is released cleanly.

use crate::supervisor::TransferSupervisor;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// How long a cancelled transfer gets to wind down
pub const TRANSFER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a shutdown receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
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
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        // Broadcast shutdown signal to all tasks; no subscribers is fine
        let _ = self.shutdown_tx.send(());
    }

    /// Cancel any running transfer and wait for it to release the flight.
    pub async fn shutdown(&self, supervisor: &TransferSupervisor) {
        info!("Graceful shutdown initiated");

        if supervisor.is_busy() {
            info!("Stopping in-flight backup");
            if !supervisor.shutdown(TRANSFER_STOP_TIMEOUT).await {
                warn!(
                    "Backup did not stop within {}s",
                    TRANSFER_STOP_TIMEOUT.as_secs()
                );
            }
        }

        info!("Graceful shutdown complete");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

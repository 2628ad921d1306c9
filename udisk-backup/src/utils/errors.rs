//! Error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("A backup is already running (operation {0})")]
    AlreadyRunning(String),

    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer process failure: {0}")]
    TransferProcessFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;

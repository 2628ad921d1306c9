//! Configuration management for the backup engine.
//!
//! Loaded from a TOML file; every key has a default so a partial (or empty)
//! file is valid.

use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Directory that gets backed up
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,

    /// Partition label that marks a drive as a backup target
    #[serde(default = "default_marker_label")]
    pub marker_label: String,

    /// Mount roots a run target must live under
    #[serde(default = "default_allowed_mount_roots")]
    pub allowed_mount_roots: Vec<PathBuf>,

    /// rsync executable (name on PATH or absolute path)
    #[serde(default = "default_rsync_binary")]
    pub rsync_binary: PathBuf,

    /// Extra arguments appended to every rsync invocation
    #[serde(default)]
    pub extra_rsync_args: Vec<String>,

    /// Maximum number of output lines kept in the live buffer
    #[serde(default = "default_live_log_max_lines")]
    pub live_log_max_lines: usize,

    /// Walk incremental trees after a run to measure hard-link savings
    #[serde(default = "default_compute_savings")]
    pub compute_savings: bool,

    /// Default number of history entries returned
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP/WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,
}

// Default values
fn default_source_path() -> PathBuf {
    PathBuf::from("/home")
}

fn default_marker_label() -> String {
    "USB_BACKUP".to_string()
}

fn default_allowed_mount_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/media"),
        PathBuf::from("/mnt"),
        PathBuf::from("/run/media"),
    ]
}

fn default_rsync_binary() -> PathBuf {
    PathBuf::from("rsync")
}

fn default_live_log_max_lines() -> usize {
    20_000
}

fn default_compute_savings() -> bool {
    true
}

fn default_history_limit() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    5080
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            marker_label: default_marker_label(),
            allowed_mount_roots: default_allowed_mount_roots(),
            rsync_binary: default_rsync_binary(),
            extra_rsync_args: Vec::new(),
            live_log_max_lines: default_live_log_max_lines(),
            compute_savings: default_compute_savings(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.backup.source_path.is_absolute() {
            return Err(BackupError::Config(format!(
                "backup.source_path must be absolute, got {}",
                self.backup.source_path.display()
            )));
        }
        if self.backup.marker_label.trim().is_empty() {
            return Err(BackupError::Config("backup.marker_label must not be empty".into()));
        }
        if let Some(root) = self
            .backup
            .allowed_mount_roots
            .iter()
            .find(|r| !r.is_absolute())
        {
            return Err(BackupError::Config(format!(
                "backup.allowed_mount_roots entries must be absolute, got {}",
                root.display()
            )));
        }
        Ok(())
    }
}

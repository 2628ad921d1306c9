//! Persisted run records.

use crate::fs::LinkSavings;
use crate::rsync::{ByteCounts, FileCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable record of one finished (completed or failed) run.
///
/// Only the identity, the two timestamps, the exit code and the success
/// flag are required when reading; summaries written by older versions may
/// lack the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub operation_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub source: PathBuf,
    #[serde(default)]
    pub target: PathBuf,
    #[serde(default)]
    pub deleted_dir: PathBuf,
    pub exit_code: i32,
    pub success: bool,
    #[serde(default)]
    pub free_bytes_before: Option<u64>,
    #[serde(default)]
    pub free_bytes_after: Option<u64>,
    #[serde(default)]
    pub file_counts: FileCounts,
    #[serde(default)]
    pub byte_counts: ByteCounts,
}

impl RunSummary {
    /// Change in free space on the target, negative when space was consumed
    pub fn free_bytes_delta(&self) -> Option<i128> {
        Some(self.free_bytes_after? as i128 - self.free_bytes_before? as i128)
    }
}

/// Whether a run had a baseline to hard link against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    pub fn from_baseline(baseline: Option<&std::path::Path>) -> Self {
        if baseline.is_some() {
            BackupType::Incremental
        } else {
            BackupType::Full
        }
    }
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupType::Full => write!(f, "Full"),
            BackupType::Incremental => write!(f, "Incremental"),
        }
    }
}

/// Side record stored next to each summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedMetadata {
    pub operation_id: String,
    pub backup_type: BackupType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<LinkSavings>,
}

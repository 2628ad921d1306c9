//! Dry-run based transfer planning.

use crate::config::BackupSettings;
use crate::fs::filesystem_space;
use crate::layout::BackupLayout;
use crate::rsync::{estimate_transfer_bytes, transfer_args, TransferMode};
use crate::{BackupError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Headroom required on top of the estimate, in percent
pub const SPACE_MARGIN_PERCENT: u128 = 105;

/// Feasibility of a transfer to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPlan {
    pub source_path: PathBuf,
    pub target_backup_dir: PathBuf,
    pub deleted_dir: PathBuf,
    pub transfer_arguments: Vec<String>,
    pub estimated_bytes: u64,
    pub free_bytes: u64,
    pub enough_space: bool,
}

/// `free >= estimated * 1.05`, exact at the boundary.
pub fn has_enough_space(free_bytes: u64, estimated_bytes: u64) -> bool {
    free_bytes as u128 * 100 >= estimated_bytes as u128 * SPACE_MARGIN_PERCENT
}

/// Reject empty, relative and `..`-containing paths.
pub fn check_absolute(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(BackupError::InvalidArgument(format!("{} must not be empty", what)));
    }
    if !path.is_absolute() {
        return Err(BackupError::InvalidArgument(format!(
            "{} must be an absolute path, got {}",
            what,
            path.display()
        )));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(BackupError::InvalidArgument(format!(
            "{} must not contain '..', got {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

pub struct TransferPlanner {
    settings: BackupSettings,
}

impl TransferPlanner {
    pub fn new(settings: BackupSettings) -> Self {
        Self { settings }
    }

    /// Estimate a transfer from `source` (default: configured source) to
    /// `target_mount` with an rsync dry run.
    pub async fn plan(&self, target_mount: &Path, source: Option<&Path>) -> Result<TransferPlan> {
        check_absolute(target_mount, "target mount")?;
        let source = source.unwrap_or(self.settings.source_path.as_path());
        check_absolute(source, "source path")?;

        let space = filesystem_space(target_mount).map_err(|e| {
            BackupError::TargetUnavailable(format!("{}: {}", target_mount.display(), e))
        })?;

        let layout = BackupLayout::new(target_mount, Utc::now());
        let baseline = layout.baseline();
        let extra = &self.settings.extra_rsync_args;
        let dry_run_args =
            transfer_args(source, &layout, baseline.as_deref(), TransferMode::DryRun, extra);

        tracing::debug!(target = %target_mount.display(), "Running rsync dry run");
        let output = Command::new(&self.settings.rsync_binary)
            .args(&dry_run_args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BackupError::TransferProcessFailure(format!(
                    "failed to launch {}: {}",
                    self.settings.rsync_binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            tracing::warn!(
                target = %target_mount.display(),
                "rsync dry run exited with {}, estimating from partial output",
                output.status
            );
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let estimated_bytes = estimate_transfer_bytes(&text);

        Ok(TransferPlan {
            source_path: source.to_path_buf(),
            target_backup_dir: layout.incremental_dir.clone(),
            deleted_dir: layout.deleted_dir.clone(),
            transfer_arguments: transfer_args(
                source,
                &layout,
                baseline.as_deref(),
                TransferMode::Live,
                extra,
            ),
            estimated_bytes,
            free_bytes: space.free_bytes,
            enough_space: has_enough_space(space.free_bytes, estimated_bytes),
        })
    }
}

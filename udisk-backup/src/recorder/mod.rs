//! Run persistence and history.
//!
//! Every finished run leaves three files in `<mount>/UDiskBackup/logs/`:
//! the JSON summary, a text report and the extended metadata. History is
//! rebuilt from those files on demand.

pub mod report;
pub mod summary;

pub use report::render_report;
pub use summary::{BackupType, ExtendedMetadata, RunSummary};

use crate::eligibility::EligibilityResolver;
use crate::layout::{self, BackupLayout};
use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXTENDED_SUFFIX: &str = "_extended.json";

/// Where a run's records were written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRun {
    pub summary_path: PathBuf,
    pub report_path: PathBuf,
    pub extended_path: PathBuf,
}

impl PersistedRun {
    /// Paths a run's records go to, whether or not they were written
    pub fn planned(layout: &BackupLayout, operation_id: &str) -> Self {
        let stem = layout.log_stem(operation_id);
        Self {
            summary_path: layout.logs_dir.join(format!("{}.json", stem)),
            report_path: layout.logs_dir.join(format!("{}.txt", stem)),
            extended_path: layout.logs_dir.join(format!("{}{}", stem, EXTENDED_SUFFIX)),
        }
    }
}

/// One row of run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub target_mount: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_type: Option<BackupType>,
    pub summary_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

pub struct RunRecorder {
    resolver: Arc<EligibilityResolver>,
}

impl RunRecorder {
    pub fn new(resolver: Arc<EligibilityResolver>) -> Self {
        Self { resolver }
    }

    /// Write the summary, report and extended metadata of one run.
    pub fn persist(
        &self,
        layout: &BackupLayout,
        summary: &RunSummary,
        extended: &ExtendedMetadata,
    ) -> Result<PersistedRun> {
        let paths = PersistedRun::planned(layout, &summary.operation_id);

        std::fs::create_dir_all(&layout.logs_dir).map_err(|e| {
            BackupError::PersistenceFailure(format!("{}: {}", layout.logs_dir.display(), e))
        })?;

        let summary_json = serde_json::to_string_pretty(summary)?;
        write_file(&paths.summary_path, summary_json.as_bytes())?;
        write_file(&paths.report_path, render_report(summary, extended).as_bytes())?;
        let extended_json = serde_json::to_string_pretty(extended)?;
        write_file(&paths.extended_path, extended_json.as_bytes())?;

        tracing::info!(
            operation_id = %summary.operation_id,
            path = %paths.summary_path.display(),
            "Run summary written"
        );
        Ok(paths)
    }

    /// Past runs, newest first, at most `max(1, limit)` of them.
    ///
    /// Scans the given mount, or every currently eligible target. Entries
    /// carry the target's label when the mount is currently eligible. Files
    /// that cannot be read or parsed are skipped.
    pub fn list_history(&self, target_mount: Option<&Path>, limit: usize) -> Vec<HistoryEntry> {
        let mounts: Vec<(PathBuf, Option<String>)> = match target_mount {
            Some(mount) => {
                let label = self.resolver.find_by_mount(mount).map(|t| t.label);
                vec![(mount.to_path_buf(), label)]
            }
            None => self
                .resolver
                .find_eligible()
                .into_iter()
                .map(|t| (t.mount_point, Some(t.label)))
                .collect(),
        };

        let mut entries = Vec::new();
        for (mount, label) in mounts {
            scan_logs(&mount, label.as_deref(), &mut entries);
        }

        entries.sort_by(|a, b| b.summary.started_at.cmp(&a.summary.started_at));
        entries.truncate(limit.max(1));
        entries
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)
        .map_err(|e| BackupError::PersistenceFailure(format!("{}: {}", path.display(), e)))
}

fn scan_logs(mount: &Path, label: Option<&str>, out: &mut Vec<HistoryEntry>) {
    let dir = layout::logs_dir(mount);
    let read_dir = match std::fs::read_dir(&dir) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "No run history: {}", e);
            return;
        }
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".json") || name.ends_with(EXTENDED_SUFFIX) {
            continue;
        }

        let summary = match read_json::<RunSummary>(&path) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Skipping unreadable summary: {}", e);
                continue;
            }
        };

        let stem = &name[..name.len() - ".json".len()];
        let extended = read_json::<ExtendedMetadata>(&dir.join(format!("{}{}", stem, EXTENDED_SUFFIX))).ok();
        let report_path = dir.join(format!("{}.txt", stem));

        out.push(HistoryEntry {
            summary,
            target_mount: mount.to_path_buf(),
            target_label: label.map(str::to_string),
            backup_type: extended.map(|e| e.backup_type),
            summary_path: path.clone(),
            report_path: report_path.is_file().then_some(report_path),
        });
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

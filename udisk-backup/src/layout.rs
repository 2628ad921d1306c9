//! On-disk layout of a backup target.
//!
//! ```text
//! <mount>/UDiskBackup/
//!   current                -> incremental/<ts>   (latest successful run)
//!   incremental/<ts>/      one tree per run
//!   .deleted/<ts>/         files removed or overwritten by that run
//!   logs/<ts>_<op>.json    run summary (+ .txt report, _extended.json)
//! ```

use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

pub const BACKUP_ROOT_DIR: &str = "UDiskBackup";
pub const CURRENT_LINK: &str = "current";
pub const INCREMENTAL_DIR: &str = "incremental";
pub const DELETED_DIR: &str = ".deleted";
pub const LOGS_DIR: &str = "logs";

/// Sortable, second resolution, UTC
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Backup root for a mount point
pub fn backup_root(mount: &Path) -> PathBuf {
    mount.join(BACKUP_ROOT_DIR)
}

/// Log directory for a mount point
pub fn logs_dir(mount: &Path) -> PathBuf {
    backup_root(mount).join(LOGS_DIR)
}

/// Every path one run touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    pub mount: PathBuf,
    pub root: PathBuf,
    pub current: PathBuf,
    pub incremental_dir: PathBuf,
    pub deleted_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub timestamp: String,
}

/// What `promote_current` did to the `current` pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentPointer {
    /// No previous pointer; a new link was created
    Created,
    /// An existing link was swapped for the new run
    Replaced,
    /// A real `current` directory (pre-link layout) was moved aside first
    Migrated { archived: PathBuf },
}

impl BackupLayout {
    pub fn new(mount: &Path, at: DateTime<Utc>) -> Self {
        let timestamp = format_timestamp(at);
        let root = backup_root(mount);
        Self {
            mount: mount.to_path_buf(),
            current: root.join(CURRENT_LINK),
            incremental_dir: root.join(INCREMENTAL_DIR).join(&timestamp),
            deleted_dir: root.join(DELETED_DIR).join(&timestamp),
            logs_dir: root.join(LOGS_DIR),
            root,
            timestamp,
        }
    }

    /// The previous run's tree, if any. Follows the `current` link.
    pub fn baseline(&self) -> Option<PathBuf> {
        if self.current.is_dir() {
            Some(self.current.clone())
        } else {
            None
        }
    }

    /// File stem shared by a run's summary, report and extended metadata
    pub fn log_stem(&self, operation_id: &str) -> String {
        format!("{}_{}", self.timestamp, operation_id)
    }

    /// Create the run's working directories.
    ///
    /// The incremental directory must be new: a second run within the same
    /// second fails with `DirectoryError` instead of writing into an earlier
    /// run's tree.
    pub fn create_run_dirs(&self) -> Result<()> {
        if let Some(parent) = self.incremental_dir.parent() {
            std::fs::create_dir_all(parent).map_err(directory_error(parent))?;
        }
        std::fs::create_dir(&self.incremental_dir).map_err(directory_error(&self.incremental_dir))?;
        for dir in [&self.deleted_dir, &self.logs_dir] {
            std::fs::create_dir_all(dir).map_err(directory_error(dir))?;
        }
        Ok(())
    }

    /// Point `current` at this run's incremental directory.
    ///
    /// The link is relative (`incremental/<ts>`) so the drive stays valid
    /// when mounted elsewhere. An existing link is replaced by renaming a
    /// freshly created link over it, so readers never see it missing.
    pub fn promote_current(&self) -> io::Result<CurrentPointer> {
        let target = Path::new(INCREMENTAL_DIR).join(&self.timestamp);

        match std::fs::symlink_metadata(&self.current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let staging = self.root.join(format!(".{}.{}", CURRENT_LINK, self.timestamp));
                let _ = std::fs::remove_file(&staging);
                symlink(&target, &staging)?;
                if let Err(e) = std::fs::rename(&staging, &self.current) {
                    let _ = std::fs::remove_file(&staging);
                    return Err(e);
                }
                Ok(CurrentPointer::Replaced)
            }
            Ok(_) => {
                let archived = self.root.join(format!("{}.pre-{}", CURRENT_LINK, self.timestamp));
                std::fs::rename(&self.current, &archived)?;
                symlink(&target, &self.current)?;
                Ok(CurrentPointer::Migrated { archived })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                symlink(&target, &self.current)?;
                Ok(CurrentPointer::Created)
            }
            Err(e) => Err(e),
        }
    }
}

fn directory_error(path: &Path) -> impl FnOnce(io::Error) -> BackupError {
    let path = path.to_path_buf();
    move |source| BackupError::DirectoryError { path, source }
}

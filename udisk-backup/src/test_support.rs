//! Shared fixtures for unit tests.

use crate::config::BackupSettings;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary tree with an allowed mount root, one mount and a source dir:
///
/// ```text
/// <root>/media/usb   mount point
/// <root>/home        source
/// ```
pub(crate) struct Sandbox {
    pub root: TempDir,
    pub mount: PathBuf,
    pub source: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let mount = root.path().join("media").join("usb");
        let source = root.path().join("home");
        std::fs::create_dir_all(&mount).unwrap();
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("notes.txt"), b"hello").unwrap();
        Self { root, mount, source }
    }

    pub fn settings(&self, rsync_binary: PathBuf) -> BackupSettings {
        BackupSettings {
            source_path: self.source.clone(),
            allowed_mount_roots: vec![self.root.path().join("media")],
            rsync_binary,
            live_log_max_lines: 1000,
            ..Default::default()
        }
    }
}

/// Write an executable `/bin/sh` script standing in for rsync.
pub(crate) fn fake_rsync(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-rsync");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

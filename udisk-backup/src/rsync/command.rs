//! rsync argument construction.

use crate::layout::BackupLayout;
use std::path::Path;

/// Whether the invocation should touch the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Estimate only (`--dry-run`)
    DryRun,
    /// Real transfer
    Live,
}

/// Build the argument list (without the program name) for one run.
///
/// `baseline` is the previous run's tree; when present unchanged files are
/// hard linked from it instead of copied.
pub fn transfer_args(
    source: &Path,
    layout: &BackupLayout,
    baseline: Option<&Path>,
    mode: TransferMode,
    extra: &[String],
) -> Vec<String> {
    let mut args = vec![
        "-a".to_string(),
        "--delete".to_string(),
        "--backup".to_string(),
        format!("--backup-dir={}", layout.deleted_dir.display()),
    ];
    if let Some(baseline) = baseline {
        args.push(format!("--link-dest={}", baseline.display()));
    }
    args.push("--stats".to_string());
    args.push("--info=progress2".to_string());
    args.extend(extra.iter().cloned());
    if mode == TransferMode::DryRun {
        args.push("--dry-run".to_string());
    }
    args.push(dir_contents(source));
    args.push(dir_contents(&layout.incremental_dir));
    args
}

/// rsync copies a directory's contents (not the directory itself) when the
/// path ends with a slash.
fn dir_contents(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.ends_with('/') {
        s.into_owned()
    } else {
        format!("{}/", s)
    }
}

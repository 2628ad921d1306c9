//! Hard-link accounting over a finished incremental tree.
//!
//! rsync's `--link-dest` reuses unchanged files from the baseline by hard
//! linking them, so a regular file with more than one link in a fresh
//! incremental directory is content that did not have to be copied again.

use serde::{Deserialize, Serialize};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use walkdir::WalkDir;

/// How much of an incremental tree was reused from the baseline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSavings {
    /// Regular files in the tree
    pub total_files: u64,

    /// Files shared with an earlier run via hard links
    pub linked_files: u64,

    /// Files whose content was written by this run
    pub new_files: u64,

    /// Bytes covered by hard-linked files
    pub linked_bytes: u64,

    /// Bytes written by this run
    pub new_bytes: u64,
}

impl LinkSavings {
    /// Share of bytes reused from the baseline, 0.0 - 100.0
    pub fn reuse_percent(&self) -> f64 {
        let total = self.linked_bytes + self.new_bytes;
        if total == 0 {
            0.0
        } else {
            self.linked_bytes as f64 / total as f64 * 100.0
        }
    }
}

/// Walk `root` (without following symlinks) and classify every regular file
/// as linked or new. Unreadable entries are skipped.
pub fn measure_link_savings(root: &Path) -> std::io::Result<LinkSavings> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut savings = LinkSavings::default();

    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        savings.total_files += 1;
        if metadata.nlink() > 1 {
            savings.linked_files += 1;
            savings.linked_bytes += metadata.len();
        } else {
            savings.new_files += 1;
            savings.new_bytes += metadata.len();
        }
    }

    Ok(savings)
}

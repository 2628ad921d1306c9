//! Filesystem capacity queries.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Capacity of the filesystem backing a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    /// Bytes available to unprivileged writers
    pub free_bytes: u64,

    /// Total size of the filesystem
    pub total_bytes: u64,
}

/// Query free and total bytes for the filesystem containing `path`.
///
/// Fails for paths that do not exist or whose mount has gone stale.
pub fn filesystem_space(path: &Path) -> std::io::Result<SpaceInfo> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(std::io::Error::from)?;
    let fragment = stat.fragment_size() as u64;

    Ok(SpaceInfo {
        free_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
        total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
    })
}

//! Selection of backup-eligible partitions.

use crate::fs::filesystem_space;
use crate::inventory::DiskInventory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A mounted partition that can receive a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTarget {
    pub mount_point: PathBuf,
    pub device: String,
    pub label: String,
    pub filesystem_type: Option<String>,
    pub free_bytes: u64,
    pub total_bytes: u64,
}

pub struct EligibilityResolver {
    inventory: Arc<dyn DiskInventory>,
    marker_label: String,
}

impl EligibilityResolver {
    pub fn new(inventory: Arc<dyn DiskInventory>, marker_label: impl Into<String>) -> Self {
        Self {
            inventory,
            marker_label: marker_label.into(),
        }
    }

    pub fn marker_label(&self) -> &str {
        &self.marker_label
    }

    /// USB partitions carrying the marker label that are currently mounted.
    ///
    /// Rebuilt on every call. A mount point that cannot be stat'ed (stale
    /// mount, drive pulled mid-query) is left out.
    pub fn find_eligible(&self) -> Vec<BackupTarget> {
        let mut targets = Vec::new();

        for disk in self.inventory.list_disks() {
            if !disk.is_usb() {
                continue;
            }
            for part in &disk.partitions {
                let Some(label) = part.label.as_deref() else {
                    continue;
                };
                if !label.eq_ignore_ascii_case(&self.marker_label) {
                    continue;
                }
                let Some(mount) = part.mounted_at() else {
                    tracing::debug!(device = %part.path, "Labeled partition is not mounted");
                    continue;
                };

                match filesystem_space(Path::new(mount)) {
                    Ok(space) => targets.push(BackupTarget {
                        mount_point: PathBuf::from(mount),
                        device: part.path.clone(),
                        label: label.to_string(),
                        filesystem_type: part.fs_type.clone(),
                        free_bytes: space.free_bytes,
                        total_bytes: space.total_bytes,
                    }),
                    Err(e) => {
                        tracing::debug!(device = %part.path, mount, "Skipping target: {}", e);
                    }
                }
            }
        }

        targets
    }

    /// The eligible target mounted at `mount`, if any
    pub fn find_by_mount(&self, mount: &Path) -> Option<BackupTarget> {
        self.find_eligible()
            .into_iter()
            .find(|t| t.mount_point == mount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Disk, Partition, StaticInventory};

    fn partition(path: &str, label: Option<&str>, mount: Option<&str>) -> Partition {
        Partition {
            path: path.into(),
            fs_type: Some("ext4".into()),
            mount_point: mount.map(Into::into),
            label: label.map(Into::into),
            ..Default::default()
        }
    }

    fn disk(path: &str, transport: &str, partitions: Vec<Partition>) -> Disk {
        Disk {
            path: path.into(),
            transport: Some(transport.into()),
            partitions,
            ..Default::default()
        }
    }

    #[test]
    fn test_filters_transport_label_and_mount() {
        let mount = tempfile::tempdir().unwrap();
        let mount_str = mount.path().to_str().unwrap();

        let inventory = StaticInventory::new(vec![
            // Internal disk with the right label
            disk("/dev/sda", "sata", vec![partition("/dev/sda1", Some("USB_BACKUP"), Some(mount_str))]),
            disk(
                "/dev/sdb",
                "usb",
                vec![
                    partition("/dev/sdb1", Some("DATA"), Some(mount_str)),
                    partition("/dev/sdb2", Some("usb_backup"), Some(mount_str)),
                    partition("/dev/sdb3", Some("USB_BACKUP"), None),
                    partition("/dev/sdb4", Some("USB_BACKUP"), Some("")),
                ],
            ),
        ]);
        let resolver = EligibilityResolver::new(Arc::new(inventory), "USB_BACKUP");

        let targets = resolver.find_eligible();
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.device, "/dev/sdb2");
        assert_eq!(target.label, "usb_backup");
        assert_eq!(target.mount_point, mount.path());
        assert!(target.total_bytes > 0);
        assert!(target.free_bytes <= target.total_bytes);
    }

    #[test]
    fn test_stale_mount_is_skipped() {
        let inventory = StaticInventory::new(vec![disk(
            "/dev/sdb",
            "USB",
            vec![partition("/dev/sdb1", Some("USB_BACKUP"), Some("/nonexistent/udisk-backup-mount"))],
        )]);
        let resolver = EligibilityResolver::new(Arc::new(inventory), "USB_BACKUP");
        assert!(resolver.find_eligible().is_empty());
    }

    #[test]
    fn test_find_by_mount() {
        let mount = tempfile::tempdir().unwrap();
        let inventory = StaticInventory::new(vec![disk(
            "/dev/sdb",
            "usb",
            vec![partition("/dev/sdb1", Some("USB_BACKUP"), mount.path().to_str())],
        )]);
        let resolver = EligibilityResolver::new(Arc::new(inventory), "USB_BACKUP");
        assert!(resolver.find_by_mount(mount.path()).is_some());
        assert!(resolver.find_by_mount(Path::new("/media/other")).is_none());
    }
}

//! Block device enumeration.

pub mod lsblk;

pub use lsblk::LsblkInventory;

use serde::{Deserialize, Serialize};

/// One physical disk and its partitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub path: String,
    pub transport: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub size_bytes: Option<u64>,
    pub rotational: Option<bool>,
    pub partitions: Vec<Partition>,
}

impl Disk {
    pub fn is_usb(&self) -> bool {
        self.transport
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("usb"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub path: String,
    pub fs_type: Option<String>,
    pub mount_point: Option<String>,
    pub label: Option<String>,
    pub size_bytes: Option<u64>,
    pub used_bytes: Option<u64>,
    pub free_bytes: Option<u64>,
}

impl Partition {
    /// Mount point, if the partition is mounted somewhere
    pub fn mounted_at(&self) -> Option<&str> {
        self.mount_point.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Source of disk and partition information.
///
/// Implementations never fail: a broken enumeration yields an empty list.
pub trait DiskInventory: Send + Sync {
    fn list_disks(&self) -> Vec<Disk>;
}

/// Fixed inventory, handy for wiring tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    disks: Vec<Disk>,
}

impl StaticInventory {
    pub fn new(disks: Vec<Disk>) -> Self {
        Self { disks }
    }
}

impl DiskInventory for StaticInventory {
    fn list_disks(&self) -> Vec<Disk> {
        self.disks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_transport_is_case_insensitive() {
        let mut disk = Disk {
            path: "/dev/sdb".into(),
            transport: Some("USB".into()),
            ..Default::default()
        };
        assert!(disk.is_usb());
        disk.transport = Some("sata".into());
        assert!(!disk.is_usb());
        disk.transport = None;
        assert!(!disk.is_usb());
    }

    #[test]
    fn test_blank_mount_point_is_unmounted() {
        let part = Partition {
            path: "/dev/sdb1".into(),
            mount_point: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(part.mounted_at(), None);
    }
}

//! `lsblk -J` backed inventory.

use super::{Disk, DiskInventory, Partition};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Command;

const COLUMNS: &str = "NAME,PATH,TRAN,VENDOR,MODEL,SERIAL,SIZE,ROTA,TYPE,FSTYPE,MOUNTPOINT,LABEL,FSUSED,FSAVAIL";

/// Runs `lsblk` on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct LsblkInventory {
    binary: PathBuf,
}

impl LsblkInventory {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("lsblk"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self) -> Result<String, String> {
        let output = Command::new(&self.binary)
            .args(["-J", "-b", "-o", COLUMNS])
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.binary.display(), e))?;
        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        String::from_utf8(output.stdout).map_err(|e| format!("non-UTF-8 lsblk output: {}", e))
    }
}

impl Default for LsblkInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskInventory for LsblkInventory {
    fn list_disks(&self) -> Vec<Disk> {
        let json = match self.run() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Disk enumeration failed: {}", e);
                return Vec::new();
            }
        };
        match parse_lsblk_json(&json) {
            Ok(disks) => disks,
            Err(e) => {
                tracing::warn!("Unparseable lsblk output: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parse `lsblk -J -b` output.
///
/// Field types drift between util-linux releases (sizes as numbers or
/// strings, `rota` as `true` or `"1"`), so values are read leniently.
pub fn parse_lsblk_json(json: &str) -> serde_json::Result<Vec<Disk>> {
    let root: Value = serde_json::from_str(json)?;
    let devices = root
        .get("blockdevices")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(devices
        .iter()
        .filter(|d| text(d, "type").as_deref() == Some("disk"))
        .map(to_disk)
        .collect())
}

fn to_disk(dev: &Value) -> Disk {
    let mut partitions: Vec<Partition> = Vec::new();
    collect_partitions(dev.get("children"), &mut partitions);

    // A stick formatted without a partition table carries the filesystem itself
    if partitions.is_empty() && text(dev, "fstype").is_some() {
        partitions.push(to_partition(dev));
    }

    Disk {
        path: device_path(dev),
        transport: text(dev, "tran"),
        vendor: text(dev, "vendor"),
        model: text(dev, "model"),
        serial: text(dev, "serial"),
        size_bytes: number(dev, "size"),
        rotational: flag(dev, "rota"),
        partitions,
    }
}

fn collect_partitions(children: Option<&Value>, out: &mut Vec<Partition>) {
    let Some(children) = children.and_then(Value::as_array) else {
        return;
    };
    for child in children {
        out.push(to_partition(child));
        // LUKS/LVM holders nest below the partition
        collect_partitions(child.get("children"), out);
    }
}

fn to_partition(dev: &Value) -> Partition {
    Partition {
        path: device_path(dev),
        fs_type: text(dev, "fstype"),
        mount_point: text(dev, "mountpoint").or_else(|| first_mountpoint(dev)),
        label: text(dev, "label"),
        size_bytes: number(dev, "size"),
        used_bytes: number(dev, "fsused"),
        free_bytes: number(dev, "fsavail"),
    }
}

fn device_path(dev: &Value) -> String {
    text(dev, "path")
        .or_else(|| text(dev, "name").map(|n| format!("/dev/{}", n)))
        .unwrap_or_default()
}

fn first_mountpoint(dev: &Value) -> Option<String> {
    dev.get("mountpoints")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

fn text(dev: &Value, key: &str) -> Option<String> {
    let s = dev.get(key)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn number(dev: &Value, key: &str) -> Option<u64> {
    match dev.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(dev: &Value, key: &str) -> Option<bool> {
    match dev.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|v| v != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

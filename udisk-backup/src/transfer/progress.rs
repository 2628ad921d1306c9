//! Live progress decoding for `--info=progress2` output.
//!
//! rsync rewrites a single status line with carriage returns while it runs:
//!
//! ```text
//!      48,113,920   2%   45.12MB/s    0:00:01 (xfr#27, to-chk=310/4213)
//! ```
//!
//! Each rewrite becomes one record in the live log; this module turns such a
//! record into numbers the UI can render.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Progress snapshot decoded from one progress2 line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    /// Bytes transferred so far
    pub transferred_bytes: u64,

    /// Percentage complete (0-100)
    pub percent: u8,

    /// Current transfer speed as rsync prints it (e.g. `45.12MB/s`)
    pub speed: String,

    /// Elapsed or remaining time as rsync prints it (`h:mm:ss`)
    pub time: String,

    /// Files transferred so far (`xfr#N`)
    pub files_transferred: Option<u64>,

    /// Files still to check (`to-chk=N/M`)
    pub files_remaining: Option<u64>,

    /// Total files considered (`to-chk=N/M`)
    pub total_files: Option<u64>,
}

impl TransferProgress {
    /// Files checked so far, when rsync reports the counter
    pub fn files_checked(&self) -> Option<u64> {
        match (self.total_files, self.files_remaining) {
            (Some(total), Some(remaining)) => Some(total.saturating_sub(remaining)),
            _ => None,
        }
    }

    /// Check if transfer is complete
    pub fn is_complete(&self) -> bool {
        self.percent >= 100 && self.files_remaining.unwrap_or(0) == 0
    }

    /// Compact one-line rendering for terminals
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{:>3}% {} {} {}",
            self.percent,
            format_bytes(self.transferred_bytes),
            self.speed,
            self.time
        );
        if let (Some(checked), Some(total)) = (self.files_checked(), self.total_files) {
            line.push_str(&format!(" files {}/{}", checked, total));
        }
        line
    }
}

static PROGRESS2_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*([0-9][0-9,]*)\s+(\d{1,3})%\s+(\S+/s)\s+(\d+:\d{2}:\d{2})(?:\s+\((?:xfr#(\d+),\s*)?(?:to-chk|to-check|ir-chk)=(\d+)/(\d+)\))?",
    )
    .unwrap()
});

/// Decode a progress2 record. Returns `None` for anything else.
pub fn parse_progress_line(line: &str) -> Option<TransferProgress> {
    let caps = PROGRESS2_LINE.captures(line)?;
    let number = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok())
    };

    Some(TransferProgress {
        transferred_bytes: number(1)?,
        percent: caps.get(2)?.as_str().parse::<u8>().ok()?.min(100),
        speed: caps.get(3)?.as_str().to_string(),
        time: caps.get(4)?.as_str().to_string(),
        files_transferred: number(5),
        files_remaining: number(6),
        total_files: number(7),
    })
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a signed byte delta (free space change) as human-readable string
pub fn format_signed_bytes(delta: i128) -> String {
    let magnitude = format_bytes(delta.unsigned_abs().min(u64::MAX as u128) as u64);
    if delta < 0 {
        format!("-{}", magnitude)
    } else {
        format!("+{}", magnitude)
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_progress2_line() {
        let progress =
            parse_progress_line("     48,113,920   2%   45.12MB/s    0:00:01 (xfr#27, to-chk=310/4213)")
                .unwrap();
        assert_eq!(progress.transferred_bytes, 48_113_920);
        assert_eq!(progress.percent, 2);
        assert_eq!(progress.speed, "45.12MB/s");
        assert_eq!(progress.time, "0:00:01");
        assert_eq!(progress.files_transferred, Some(27));
        assert_eq!(progress.files_remaining, Some(310));
        assert_eq!(progress.total_files, Some(4213));
        assert_eq!(progress.files_checked(), Some(3903));
        assert!(!progress.is_complete());
        assert_eq!(progress.status_line(), "  2% 45.89 MB 45.12MB/s 0:00:01 files 3903/4213");
    }

    #[test]
    fn test_parse_line_without_counters() {
        let progress = parse_progress_line("  1,238,099 100%  146.38kB/s    0:00:08").unwrap();
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.files_transferred, None);
        assert_eq!(progress.files_checked(), None);
        assert!(progress.is_complete());
        assert_eq!(progress.status_line(), "100% 1.18 MB 146.38kB/s 0:00:08");
    }

    #[test]
    fn test_non_progress_lines() {
        assert!(parse_progress_line("sending incremental file list").is_none());
        assert!(parse_progress_line("Number of files: 4,213 (reg: 3,901, dir: 312)").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_signed_bytes() {
        assert_eq!(format_signed_bytes(-2048), "-2.00 KB");
        assert_eq!(format_signed_bytes(1024 * 1024), "+1.00 MB");
        assert_eq!(format_signed_bytes(0), "+0.00 B");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}

//! Parser for the `--stats` block rsync prints at the end of a run.
//!
//! Each field is extracted on its own so a missing or renamed line only
//! zeroes that field. When a field appears more than once the last
//! occurrence wins (the stats block is always at the end of the output).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// File counters from the stats block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileCounts {
    pub total: u64,
    pub dirs: u64,
    pub transferred: u64,
    pub deleted: u64,
    pub created: u64,
}

/// Byte counters from the stats block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ByteCounts {
    pub total_file_size: u64,
    pub total_transferred: u64,
    pub literal_data: u64,
    pub matched_data: u64,
    pub file_list_size: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Everything we extract from one run's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub files: FileCounts,
    pub bytes: ByteCounts,
}

const NUMBER: &str = r"([0-9][0-9,]*(?:\.[0-9]+)?)[ \t]*([KMGTP]?)";

fn field(label: &str) -> Regex {
    // Labels are fixed strings from this module, so the pattern is always valid.
    Regex::new(&format!(r"(?m)^[ \t]*{}:[ \t]*{}", label, NUMBER)).unwrap()
}

static NUM_FILES: LazyLock<Regex> = LazyLock::new(|| field("Number of files"));
static NUM_DIRS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*Number of files:[^\n(]*\([^\n)]*\bdir:\s*([0-9][0-9,]*)").unwrap());
static NUM_CREATED: LazyLock<Regex> = LazyLock::new(|| field("Number of created files"));
static NUM_DELETED: LazyLock<Regex> = LazyLock::new(|| field("Number of deleted files"));
static NUM_TRANSFERRED: LazyLock<Regex> =
    LazyLock::new(|| field("Number of (?:regular )?files transferred"));
static TOTAL_FILE_SIZE: LazyLock<Regex> = LazyLock::new(|| field("Total file size"));
static TOTAL_TRANSFERRED: LazyLock<Regex> = LazyLock::new(|| field("Total transferred file size"));
static LITERAL_DATA: LazyLock<Regex> = LazyLock::new(|| field("Literal data"));
static MATCHED_DATA: LazyLock<Regex> = LazyLock::new(|| field("Matched data"));
static FILE_LIST_SIZE: LazyLock<Regex> = LazyLock::new(|| field("File list size"));
static BYTES_SENT: LazyLock<Regex> = LazyLock::new(|| field("Total bytes sent"));
static BYTES_RECEIVED: LazyLock<Regex> = LazyLock::new(|| field("Total bytes received"));

/// Parse a number as rsync prints it: `48,113,920`, `131022` or, with
/// `--human-readable`, `1.82G` (powers of 1024).
pub fn parse_rsync_number(digits: &str, suffix: &str) -> Option<u64> {
    let cleaned: String = digits.chars().filter(|c| *c != ',').collect();
    let multiplier: u64 = match suffix {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        "P" => 1 << 50,
        _ => return None,
    };

    if let Ok(value) = cleaned.parse::<u64>() {
        return value.checked_mul(multiplier);
    }
    let value = cleaned.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64).round() as u64)
}

fn last_number(re: &Regex, text: &str) -> Option<u64> {
    let caps = re.captures_iter(text).last()?;
    let digits = caps.get(1)?.as_str();
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    parse_rsync_number(digits, suffix)
}

/// Extract the full stats block. Absent fields are 0.
pub fn parse_transfer_stats(output: &str) -> TransferStats {
    let get = |re: &Regex| last_number(re, output).unwrap_or(0);

    TransferStats {
        files: FileCounts {
            total: get(&NUM_FILES),
            dirs: NUM_DIRS
                .captures_iter(output)
                .last()
                .and_then(|c| c.get(1))
                .and_then(|m| parse_rsync_number(m.as_str(), ""))
                .unwrap_or(0),
            transferred: get(&NUM_TRANSFERRED),
            deleted: get(&NUM_DELETED),
            created: get(&NUM_CREATED),
        },
        bytes: ByteCounts {
            total_file_size: get(&TOTAL_FILE_SIZE),
            total_transferred: get(&TOTAL_TRANSFERRED),
            literal_data: get(&LITERAL_DATA),
            matched_data: get(&MATCHED_DATA),
            file_list_size: get(&FILE_LIST_SIZE),
            bytes_sent: get(&BYTES_SENT),
            bytes_received: get(&BYTES_RECEIVED),
        },
    }
}

/// Bytes a dry run says it would transfer.
///
/// Order: `Total transferred file size`, then `Literal data`, then 0.
pub fn estimate_transfer_bytes(output: &str) -> u64 {
    last_number(&TOTAL_TRANSFERRED, output)
        .or_else(|| last_number(&LITERAL_DATA, output))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Captured from rsync 3.2.7 (`-a --stats --info=progress2`).
    const RSYNC_32_LIVE: &str = "\
sending incremental file list
     48,113,920   2%   45.12MB/s    0:00:01 (xfr#27, to-chk=0/4213)

Number of files: 4,213 (reg: 3,901, dir: 312)
Number of created files: 12 (reg: 11, dir: 1)
Number of deleted files: 3 (reg: 3)
Number of regular files transferred: 27
Total file size: 1,824,771,334 bytes
Total transferred file size: 48,113,920 bytes
Literal data: 48,113,920 bytes
Matched data: 0 bytes
File list size: 131,022
File list generation time: 0.003 seconds
File list transfer time: 0.000 seconds
Total bytes sent: 48,279,301
Total bytes received: 652

sent 48,279,301 bytes  received 652 bytes  32,186,635.33 bytes/sec
total size is 1,824,771,334  speedup is 37.80
";

    /// Captured from a `--dry-run` against an unchanged baseline.
    const RSYNC_32_DRY_RUN: &str = "\
sending incremental file list

Number of files: 1,002 (reg: 950, dir: 52)
Number of created files: 0
Number of deleted files: 0
Number of regular files transferred: 0
Total file size: 90,000,000,000 bytes
Total transferred file size: 0 bytes
Literal data: 0 bytes
Matched data: 0 bytes
File list size: 0
File list generation time: 0.001 seconds
File list transfer time: 0.000 seconds
Total bytes sent: 29,931
Total bytes received: 19

sent 29,931 bytes  received 19 bytes  59,900.00 bytes/sec
total size is 90,000,000,000  speedup is 3,005,008.35 (DRY RUN)
";

    /// rsync 3.0 output (older field names, no breakdowns).
    const RSYNC_30: &str = "\
Number of files: 120
Number of files transferred: 7
Total file size: 5242880 bytes
Total transferred file size: 1048576 bytes
Literal data: 1048576 bytes
Matched data: 0 bytes
File list size: 2711
Total bytes sent: 1051950
Total bytes received: 172
";

    /// Partial transfer (exit 23): errors interleaved with the stats block.
    const RSYNC_PARTIAL: &str = "\
rsync: [sender] send_files failed to open \"/home/u/private.key\": Permission denied (13)
     1,024 100%    0.98MB/s    0:00:00 (xfr#1, to-chk=0/3)

Number of files: 3 (reg: 2, dir: 1)
Number of regular files transferred: 1
Total file size: 2,048 bytes
Literal data: 1,024 bytes
Matched data: 0 bytes
rsync error: some files/attrs were not transferred (see previous errors) (code 23) at main.c(1338) [sender=3.2.7]
";

    #[test]
    fn test_parse_live_stats() {
        let stats = parse_transfer_stats(RSYNC_32_LIVE);
        assert_eq!(
            stats.files,
            FileCounts {
                total: 4213,
                dirs: 312,
                transferred: 27,
                deleted: 3,
                created: 12,
            }
        );
        assert_eq!(
            stats.bytes,
            ByteCounts {
                total_file_size: 1_824_771_334,
                total_transferred: 48_113_920,
                literal_data: 48_113_920,
                matched_data: 0,
                file_list_size: 131_022,
                bytes_sent: 48_279_301,
                bytes_received: 652,
            }
        );
    }

    #[test]
    fn test_parse_old_field_names() {
        let stats = parse_transfer_stats(RSYNC_30);
        assert_eq!(stats.files.total, 120);
        assert_eq!(stats.files.dirs, 0);
        assert_eq!(stats.files.transferred, 7);
        assert_eq!(stats.bytes.total_transferred, 1_048_576);
        assert_eq!(stats.bytes.file_list_size, 2711);
        assert_eq!(stats.bytes.bytes_received, 172);
    }

    #[test]
    fn test_parse_partial_output() {
        let stats = parse_transfer_stats(RSYNC_PARTIAL);
        assert_eq!(stats.files.total, 3);
        assert_eq!(stats.files.dirs, 1);
        assert_eq!(stats.files.transferred, 1);
        assert_eq!(stats.bytes.total_transferred, 0);
        assert_eq!(stats.bytes.literal_data, 1024);
        assert_eq!(stats.bytes.bytes_sent, 0);
    }

    #[test]
    fn test_estimate_prefers_total_transferred() {
        assert_eq!(estimate_transfer_bytes(RSYNC_32_LIVE), 48_113_920);
        assert_eq!(estimate_transfer_bytes(RSYNC_32_DRY_RUN), 0);
    }

    #[test]
    fn test_estimate_falls_back_to_literal_data() {
        assert_eq!(estimate_transfer_bytes(RSYNC_PARTIAL), 1024);
    }

    #[test]
    fn test_estimate_defaults_to_zero() {
        assert_eq!(estimate_transfer_bytes(""), 0);
        assert_eq!(estimate_transfer_bytes("rsync: connection unexpectedly closed"), 0);
    }

    #[test]
    fn test_last_occurrence_wins() {
        let text = "Total transferred file size: 10 bytes\nTotal transferred file size: 20 bytes\n";
        assert_eq!(estimate_transfer_bytes(text), 20);
    }

    #[test]
    fn test_human_readable_numbers() {
        assert_eq!(parse_rsync_number("1.5", "K"), Some(1536));
        assert_eq!(parse_rsync_number("2", "G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_rsync_number("1,234", ""), Some(1234));
        assert_eq!(parse_rsync_number("3", "X"), None);

        let text = "Total transferred file size: 1.50M bytes";
        assert_eq!(estimate_transfer_bytes(text), 1_572_864);
    }
}

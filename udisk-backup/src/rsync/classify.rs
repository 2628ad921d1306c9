//! Classification of rsync output lines for the live log.
//!
//! Precedence is error > progress > info: a progress line that also carries
//! an error message is reported as an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Kind of a single output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Error,
    Progress,
    Info,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Error => "error",
            LineKind::Progress => "progress",
            LineKind::Info => "info",
        }
    }
}

// Word boundaries keep names such as `error_logs` or `failed_uploads` from
// matching. Path tokens are masked out before this runs.
static ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^\s*rsync( error)?:|\berror:|\bfailed\b|\bfailure\b|permission denied|no such file or directory|\bcannot\b|\bcould not\b|\bio error\b)",
    )
    .unwrap()
});

// Any whitespace-separated token containing a `/`
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S*/\S*").unwrap());

static PROGRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}%|\b(?:to-chk|to-check|ir-chk)=\d+/\d+").unwrap());

/// Classify one line. Pure and total.
pub fn classify_line(line: &str) -> LineKind {
    // Directory names like `failed/` or `cannot-open/` are not errors
    let without_paths = PATH_TOKEN.replace_all(line, " ");
    if ERROR_PATTERN.is_match(&without_paths) {
        LineKind::Error
    } else if PROGRESS_PATTERN.is_match(line) {
        LineKind::Progress
    } else {
        LineKind::Info
    }
}

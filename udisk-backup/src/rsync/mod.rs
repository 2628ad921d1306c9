//! Integration with the external `rsync` binary.
//!
//! Everything that depends on rsync's command line or its human-readable
//! output lives here so the rest of the engine only sees typed values.

pub mod classify;
pub mod command;
pub mod stats;

pub use classify::{classify_line, LineKind};
pub use command::{transfer_args, TransferMode};
pub use stats::{estimate_transfer_bytes, parse_transfer_stats, ByteCounts, FileCounts, TransferStats};

//! UDisk Backup Library
//!
//! Incremental rsync backups to labeled USB drives: target discovery,
//! dry-run planning, single-flight transfer supervision with live output,
//! and persisted run history.

pub mod config;
pub mod daemon;
pub mod eligibility;
pub mod fs;
pub mod inventory;
pub mod layout;
pub mod notify;
pub mod planner;
pub mod recorder;
pub mod rsync;
pub mod supervisor;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use eligibility::{BackupTarget, EligibilityResolver};
pub use notify::{BackupEvent, NotificationSink};
pub use planner::{TransferPlan, TransferPlanner};
pub use recorder::{HistoryEntry, RunRecorder, RunSummary};
pub use supervisor::{RunPhase, RunState, TransferSupervisor};
pub use utils::errors::{BackupError, Result};

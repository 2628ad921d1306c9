//! Utility modules shared by the library and binaries.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};

//! Process lifecycle helpers for the long-running binaries.

pub mod shutdown;

pub use shutdown::ShutdownCoordinator;

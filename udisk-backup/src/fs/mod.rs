//! Filesystem helpers: capacity queries and incremental-tree accounting.

pub mod space;
pub mod walker;

pub use space::{filesystem_space, SpaceInfo};
pub use walker::{measure_link_savings, LinkSavings};

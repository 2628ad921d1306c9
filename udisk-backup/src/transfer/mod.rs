//! Transfer progress parsing and human-readable formatting.

pub mod progress;

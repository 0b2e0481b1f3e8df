//! Diagnostics refresh, collection and rendering

pub mod changes;
pub mod collector;
pub mod error;
pub mod format;
pub mod refresh;
pub mod settle;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use changes::GitDiff;

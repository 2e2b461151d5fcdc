//! Utility modules shared by the build and the watcher.

pub mod category;
pub mod exec;

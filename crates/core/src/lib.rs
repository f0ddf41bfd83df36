//! Core library for the action artifact verification harness
//!
//! This crate validates a packaged action end to end: the manifest's
//! structure and schema, the presence of its entry points, and the behavior of
//! those entry points when run as real child processes, including the rule
//! that the `post` phase only runs once `main` has completed.

pub mod config;
pub mod deferred;
pub mod errors;
pub mod graph;
pub mod lifecycle;
pub mod logging;
pub mod manifest;
pub mod report;
pub mod suite;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

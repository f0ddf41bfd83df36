//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod plan;
pub mod run;

use actverify_core::config::HarnessConfig;
use anyhow::Result;
use std::path::Path;

/// Load the harness configuration file when one was given, else the defaults
pub(crate) fn load_base_config(config_path: Option<&Path>) -> Result<HarnessConfig> {
    match config_path {
        Some(path) => Ok(HarnessConfig::load_from_path(path)?),
        None => Ok(HarnessConfig::default()),
    }
}

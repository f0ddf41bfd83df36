//! Shared test helpers for core integration tests.
#![allow(dead_code)]

use actverify_core::config::HarnessConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway build output directory with a manifest and `sh` entry points
pub struct ActionFixture {
    dir: TempDir,
}

impl ActionFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn dist(&self) -> &Path {
        self.dir.path()
    }

    /// Write `action.yml`
    pub fn manifest(&self, yaml: &str) -> &Self {
        fs::write(self.dist().join("action.yml"), yaml).unwrap();
        self
    }

    /// Write an entry-point script
    pub fn script(&self, name: &str, body: &str) -> &Self {
        fs::write(self.dist().join(name), body).unwrap();
        self
    }

    /// A path inside the dist directory, for marker files
    pub fn path(&self, name: &str) -> PathBuf {
        self.dist().join(name)
    }

    /// Default configuration with entry points run through `sh`
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            interpreter: Some("sh".to_string()),
            ..HarnessConfig::new(self.dist())
        }
    }

    pub fn config_with_post(&self) -> HarnessConfig {
        HarnessConfig {
            check_post: true,
            ..self.config()
        }
    }
}

/// Manifest naming a node runtime and the given entry points
pub fn node_manifest(main: &str, post: Option<&str>) -> String {
    let mut yaml = format!(
        "name: fixture\ndescription: test action\nruns:\n  using: node20\n  main: {}\n",
        main
    );
    if let Some(post) = post {
        yaml.push_str(&format!("  post: {}\n", post));
    }
    yaml
}

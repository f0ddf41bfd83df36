//! Harness configuration
//!
//! A [`HarnessConfig`] describes where the build artifact lives and how its
//! entry points are exercised. Every field has a default, so an empty TOML file
//! (or no file at all) yields the conventional setup: `dist/action.yml`, a
//! `node` runtime, the `branch` and `working-directory` inputs set to
//! `test-dummy`, and `foobar` as the expected output.

use crate::errors::{ConfigError, HarnessError, Result};
use crate::lifecycle::{ActionPhase, ExecutionContext};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Default build output directory
pub const DEFAULT_DIST_DIR: &str = "dist";
/// Default manifest file name
pub const DEFAULT_MANIFEST_FILE: &str = "action.yml";
/// Default runtime family token expected at the start of `runs.using`
pub const DEFAULT_RUNTIME_FAMILY: &str = "node";
/// Default program used to launch entry points
pub const DEFAULT_INTERPRETER: &str = "node";
/// Default sentinel output
pub const DEFAULT_EXPECTED_OUTPUT: &str = "foobar";
/// Value given to every default input
pub const DUMMY_INPUT_VALUE: &str = "test-dummy";

fn default_inputs() -> IndexMap<String, String> {
    let mut inputs = IndexMap::new();
    inputs.insert("branch".to_string(), DUMMY_INPUT_VALUE.to_string());
    inputs.insert(
        "working-directory".to_string(),
        DUMMY_INPUT_VALUE.to_string(),
    );
    inputs
}

/// Configuration for one suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Build output directory holding the manifest and entry points
    pub dist_dir: PathBuf,
    /// Manifest file, relative to `dist_dir`
    pub manifest_file: String,
    /// Required prefix of `runs.using`
    pub runtime_family: String,
    /// Program used to launch entry points; `None` executes them directly.
    /// An empty string in a config file means `None`.
    #[serde(deserialize_with = "deserialize_interpreter")]
    pub interpreter: Option<String>,
    /// Action inputs, injected as `INPUT_*` environment variables
    pub inputs: IndexMap<String, String>,
    /// Sentinel output every entry point must produce
    pub expected_output: String,
    /// Also check the `post` phase
    pub check_post: bool,
    /// Pass the parent environment through to entry points
    pub inherit_env: bool,
    /// Working directory for entry points; defaults to the harness's own
    pub working_directory: Option<PathBuf>,
}

fn deserialize_interpreter<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|program| !program.trim().is_empty()))
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            dist_dir: PathBuf::from(DEFAULT_DIST_DIR),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            runtime_family: DEFAULT_RUNTIME_FAMILY.to_string(),
            interpreter: Some(DEFAULT_INTERPRETER.to_string()),
            inputs: default_inputs(),
            expected_output: DEFAULT_EXPECTED_OUTPUT.to_string(),
            check_post: false,
            inherit_env: false,
            working_directory: None,
        }
    }
}

impl HarnessConfig {
    /// Create a default configuration rooted at `dist_dir`
    pub fn new(dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist,
    /// `ConfigError::Parsing` for malformed TOML or unknown keys, and
    /// `ConfigError::Validation` if [`validate`](Self::validate) rejects it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading harness configuration from {}", path.display());

        if !path.exists() {
            return Err(HarnessError::Config(ConfigError::NotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: HarnessConfig = toml::from_str(&content).map_err(|e| {
            debug!("Failed to parse configuration file: {}", e);
            ConfigError::Parsing {
                message: e.to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot describe a runnable suite
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(HarnessError::Config(ConfigError::Validation {
                message: message.to_string(),
            }))
        };

        if self.manifest_file.trim().is_empty() {
            return invalid("manifestFile must not be empty");
        }
        if self.runtime_family.is_empty() {
            return invalid("runtimeFamily must not be empty");
        }
        if matches!(self.interpreter.as_deref(), Some(i) if i.trim().is_empty()) {
            return invalid(
                "interpreter must name a program; use None to run entry points directly",
            );
        }
        if self.inputs.keys().any(|name| name.trim().is_empty()) {
            return invalid("input names must not be empty");
        }
        Ok(())
    }

    /// Full path to the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.dist_dir.join(&self.manifest_file)
    }

    /// Lifecycle phases covered by the suite
    pub fn phases(&self) -> Vec<ActionPhase> {
        if self.check_post {
            vec![ActionPhase::Main, ActionPhase::Post]
        } else {
            vec![ActionPhase::Main]
        }
    }

    /// Execution context shared by every entry point in the suite
    pub fn execution_context(&self) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(self.interpreter.clone())
            .with_inherited_env(self.inherit_env);
        if let Some(dir) = &self.working_directory {
            ctx = ctx.with_working_directory(dir.clone());
        }
        self.inputs
            .iter()
            .fold(ctx, |ctx, (name, value)| ctx.with_input(name, value.clone()))
    }
}

/// Parse a `NAME=VALUE` input assignment
pub fn parse_input_assignment(raw: &str) -> std::result::Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::Validation {
            message: format!("invalid input `{}`, expected NAME=VALUE", raw),
        }),
    }
}

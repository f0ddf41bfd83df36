//! Error types and handling
//!
//! The taxonomy mirrors the stages of an action artifact's life: the manifest
//! (structure and schema), the execution of an entry point, the assertion on
//! its output, and harness configuration. Each domain enum is wrapped in the
//! main [`HarnessError`] enum for unified handling.
//!
//! Errors produced by a suite step travel through the step graph as a
//! [`StepFailure`], which shares the underlying error behind an `Arc` so that
//! every dependent step observes the identical cause.

use crate::graph::StepId;
use crate::lifecycle::ActionPhase;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Manifest and artifact structure errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file is absent from the build output directory
    #[error("Manifest file not found: {path}")]
    NotFound { path: String },

    /// Manifest file exists but could not be read
    #[error("Failed to read manifest file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest file was read but holds no content
    #[error("Manifest file is empty: {path}")]
    Empty { path: String },

    /// Manifest content is not valid YAML
    #[error("Failed to parse manifest: {0}")]
    Parsing(#[from] serde_yaml::Error),

    /// Manifest parsed to a scalar (or null) instead of a structured document
    #[error("Manifest is not a structured document (found {kind})")]
    NotStructured { kind: &'static str },

    /// A required field is missing
    #[error("Manifest is missing required field `{field}`")]
    MissingField { field: String },

    /// A field is present but has the wrong type
    #[error("Manifest field `{field}` must be a {expected}, found {found}")]
    InvalidFieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// `runs.using` names a different runtime family
    #[error("Manifest field `{field}` is `{value}`, expected it to start with `{expected_prefix}`")]
    RuntimeMismatch {
        field: String,
        value: String,
        expected_prefix: String,
    },

    /// An entry point referenced by the manifest is absent
    #[error("Entry point for runs.{phase} not found: {path}")]
    EntryPointNotFound { phase: ActionPhase, path: String },
}

/// Entry point execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The child process could not be launched
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading one of the child's output streams failed
    #[error("Failed to read {stream} of child process: {source}")]
    Capture {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the child to exit failed
    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    /// The child exited with a non-zero code; `output` is the tagged transcript
    #[error("Exit code: {code}\n{output}")]
    NonZeroExit { code: i32, output: String },
}

/// Output assertion errors
#[derive(Error, Debug)]
pub enum AssertionError {
    /// The process ran cleanly but produced the wrong output
    #[error("Expected output {expected:?}, got {actual:?}\n{transcript}")]
    OutputMismatch {
        expected: String,
        actual: String,
        transcript: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),
}

/// Internal/generic fallback errors
#[derive(Error, Debug)]
pub enum InternalError {
    /// A step asked for a value from a step it does not declare as a predecessor
    #[error("Step `{step}` does not declare `{requested}` as a predecessor")]
    UndeclaredDependency { step: String, requested: String },

    /// A predecessor settled with a value of an unexpected kind
    #[error("Step `{step}` produced {found}, expected {expected}")]
    UnexpectedValue {
        step: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The step graph is malformed
    #[error("Invalid step graph: {message}")]
    InvalidGraph { message: String },

    /// The producer of a deferred value went away without settling it
    #[error("Producer dropped without settling its value")]
    Abandoned,
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Manifest and artifact structure errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Entry point execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Output assertion errors
    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal/generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

/// Convenience type alias for Results with HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A failed step outcome as seen by the step itself and by all of its dependents.
///
/// Cloning shares the same underlying error. `origin` is the step that first
/// produced the error; it is `None` only when a producer was dropped unsettled.
#[derive(Debug, Clone)]
pub struct StepFailure {
    origin: Option<StepId>,
    error: Arc<HarnessError>,
}

impl StepFailure {
    /// Create a failure originating at `origin`
    pub fn new(origin: StepId, error: impl Into<HarnessError>) -> Self {
        Self {
            origin: Some(origin),
            error: Arc::new(error.into()),
        }
    }

    /// The step that produced the error
    pub fn origin(&self) -> Option<StepId> {
        self.origin
    }

    /// The underlying error
    pub fn error(&self) -> &HarnessError {
        &self.error
    }

    /// Whether two failures share the very same underlying error
    pub fn same_cause(&self, other: &StepFailure) -> bool {
        Arc::ptr_eq(&self.error, &other.error)
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for StepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.error)
    }
}

impl From<crate::deferred::Abandoned> for StepFailure {
    fn from(_: crate::deferred::Abandoned) -> Self {
        Self {
            origin: None,
            error: Arc::new(InternalError::Abandoned.into()),
        }
    }
}

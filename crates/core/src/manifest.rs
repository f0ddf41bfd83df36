//! Action manifest parsing and field lookup
//!
//! The manifest (conventionally `action.yml`) is treated as a generic YAML
//! document. Only the `runs` section is interpreted: `runs.using` names the
//! runtime family and version, `runs.main` and `runs.post` name the entry-point
//! files relative to the build output directory.

use crate::errors::ManifestError;
use crate::lifecycle::ActionPhase;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Manifest field naming the runtime
pub const RUNS_USING: &str = "runs.using";

/// Parsed action manifest. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    document: Value,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

impl Manifest {
    /// Parse manifest text.
    ///
    /// Fails with [`ManifestError::Parsing`] on invalid YAML and with
    /// [`ManifestError::NotStructured`] when the document is a scalar or null.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let document: Value = serde_yaml::from_str(text)?;
        if matches!(document, Value::Mapping(_) | Value::Sequence(_)) {
            Ok(Self { document })
        } else {
            Err(ManifestError::NotStructured {
                kind: kind_of(&document),
            })
        }
    }

    /// Look up a dotted path such as `runs.using`
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .try_fold(&self.document, |value, key| value.get(key))
    }

    /// Look up a dotted path that must hold a string
    pub fn string_field(&self, dotted: &str) -> Result<&str, ManifestError> {
        match self.get(dotted) {
            None | Some(Value::Null) => Err(ManifestError::MissingField {
                field: dotted.to_string(),
            }),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ManifestError::InvalidFieldType {
                field: dotted.to_string(),
                expected: "string",
                found: kind_of(other),
            }),
        }
    }

    /// `runs.using`
    pub fn runs_using(&self) -> Result<&str, ManifestError> {
        self.string_field(RUNS_USING)
    }

    /// Check that `runs.using` begins with the runtime family token
    pub fn check_runtime_family(&self, family: &str) -> Result<&str, ManifestError> {
        let using = self.runs_using()?;
        if using.starts_with(family) {
            Ok(using)
        } else {
            Err(ManifestError::RuntimeMismatch {
                field: RUNS_USING.to_string(),
                value: using.to_string(),
                expected_prefix: family.to_string(),
            })
        }
    }

    /// Relative entry-point path for a phase
    pub fn entry_point(&self, phase: ActionPhase) -> Result<&str, ManifestError> {
        self.string_field(phase.manifest_field())
    }

    /// Entry-point path for a phase joined onto the build output directory
    pub fn resolve_entry_point(
        &self,
        phase: ActionPhase,
        dist_dir: &Path,
    ) -> Result<PathBuf, ManifestError> {
        Ok(dist_dir.join(self.entry_point(phase)?))
    }
}

//! Run command implementation
//!
//! Implements `actverify run`: resolves the harness configuration from the
//! optional config file and CLI overrides, runs the lifecycle suite, and
//! renders the report.

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use actverify_core::config::{parse_input_assignment, HarnessConfig};
use actverify_core::errors::HarnessError;
use actverify_core::report::SuiteReport;
use actverify_core::suite::run_suite;

use super::load_base_config;
use crate::cli::OutputFormat;
use crate::ui::report::render_report_text;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config_path: Option<PathBuf>,
    pub dist_dir: Option<PathBuf>,
    pub manifest_file: Option<String>,
    pub post: bool,
    pub interpreter: Option<String>,
    pub direct: bool,
    pub inputs: Vec<String>,
    pub expected_output: Option<String>,
    pub runtime_family: Option<String>,
    pub inherit_env: bool,
    pub output: OutputFormat,
}

/// Execute the run command
pub async fn execute_run(args: RunArgs) -> Result<()> {
    debug!("Run args: {:?}", args);

    let base = load_base_config(args.config_path.as_deref())?;
    let config = apply_overrides(base, &args)?;
    info!(
        "Running lifecycle suite for {}",
        config.manifest_path().display()
    );

    let report = run_suite(config).await?;

    match args.output {
        OutputFormat::Text => print!("{}", render_report_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    check_passed(&report)
}

/// Layer CLI flags over the loaded configuration
fn apply_overrides(mut config: HarnessConfig, args: &RunArgs) -> Result<HarnessConfig> {
    if let Some(dist_dir) = &args.dist_dir {
        config.dist_dir = dist_dir.clone();
    }
    if let Some(manifest_file) = &args.manifest_file {
        config.manifest_file = manifest_file.clone();
    }
    if args.post {
        config.check_post = true;
    }
    if args.direct {
        config.interpreter = None;
    } else if let Some(interpreter) = &args.interpreter {
        config.interpreter = Some(interpreter.clone());
    }
    for raw in &args.inputs {
        let (name, value) = parse_input_assignment(raw).map_err(HarnessError::from)?;
        config.inputs.insert(name, value);
    }
    if let Some(expected) = &args.expected_output {
        config.expected_output = expected.clone();
    }
    if let Some(family) = &args.runtime_family {
        config.runtime_family = family.clone();
    }
    if args.inherit_env {
        config.inherit_env = true;
    }
    Ok(config)
}

fn check_passed(report: &SuiteReport) -> Result<()> {
    if report.passed {
        return Ok(());
    }
    let summary = report.summary;
    if report.aborted {
        bail!(
            "Verification aborted: {} of {} cases failed, {} not run",
            summary.failed,
            summary.total,
            summary.not_run
        );
    }
    bail!(
        "Verification failed: {} of {} cases failed",
        summary.failed,
        summary.total
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            config_path: None,
            dist_dir: None,
            manifest_file: None,
            post: false,
            interpreter: None,
            direct: false,
            inputs: Vec::new(),
            expected_output: None,
            runtime_family: None,
            inherit_env: false,
            output: OutputFormat::Text,
        }
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let config = apply_overrides(HarnessConfig::default(), &args()).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let base = HarnessConfig::new("from-file");

        let run = RunArgs {
            dist_dir: Some(PathBuf::from("build")),
            post: true,
            interpreter: Some("sh".to_string()),
            inputs: vec!["branch=main".to_string(), "token=x=y".to_string()],
            expected_output: Some("done".to_string()),
            ..args()
        };
        let config = apply_overrides(base, &run).unwrap();

        assert_eq!(config.dist_dir, PathBuf::from("build"));
        assert!(config.check_post);
        assert_eq!(config.interpreter.as_deref(), Some("sh"));
        assert_eq!(config.expected_output, "done");
        assert_eq!(config.inputs.get("branch").map(String::as_str), Some("main"));
        assert_eq!(config.inputs.get("token").map(String::as_str), Some("x=y"));
        // Untouched defaults survive
        assert_eq!(
            config.inputs.get("working-directory").map(String::as_str),
            Some("test-dummy")
        );
    }

    #[test]
    fn test_direct_clears_interpreter() {
        let run = RunArgs {
            direct: true,
            ..args()
        };
        let config = apply_overrides(HarnessConfig::default(), &run).unwrap();
        assert!(config.interpreter.is_none());
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let run = RunArgs {
            inputs: vec!["novalue".to_string()],
            ..args()
        };
        let err = apply_overrides(HarnessConfig::default(), &run).unwrap_err();
        assert!(err.to_string().contains("expected NAME=VALUE"));
    }
}

//! Text rendering for suite reports and plans.
//!
//! Output contracts:
//! - JSON mode: the serialized report or plan on stdout, logs on stderr
//! - Text mode: human-readable lines on stdout, logs on stderr
//!
//! Styling comes from `console`, which drops colors when stdout is not a terminal.

use actverify_core::report::{CaseReport, CaseStatus, SuiteReport};
use console::style;

use crate::commands::plan::PlanEntry;

/// Render a suite report as text, one line per case in declaration order
pub fn render_report_text(report: &SuiteReport) -> String {
    let mut output = String::new();

    let header = format!("Action Verification ({})", report.manifest);
    output.push_str(&format!("{}\n", style(header).bold()));

    for case in &report.cases {
        output.push_str(&render_case(case));
    }

    let summary = report.summary;
    let message = format!(
        "{} passed, {} failed, {} not run",
        summary.passed, summary.failed, summary.not_run
    );
    let styled = if report.passed {
        style(message).green()
    } else {
        style(message).red().bold()
    };
    output.push_str(&format!("\nSummary: {}\n", styled));
    output
}

fn render_case(case: &CaseReport) -> String {
    let (icon, status) = match case.status {
        CaseStatus::Passed => (
            style("[OK]").green().to_string(),
            style("passed").green().to_string(),
        ),
        CaseStatus::Failed => (
            style("[X]").red().to_string(),
            style("FAILED").red().bold().to_string(),
        ),
        CaseStatus::NotRun => (
            style("[--]").yellow().to_string(),
            style("not run").yellow().to_string(),
        ),
    };

    let mut line = format!(
        "  {} {}: {} {}\n",
        icon,
        case.name,
        status,
        style(format!("({} ms)", case.duration_ms)).dim()
    );

    if let Some(error) = &case.error {
        for error_line in error.lines() {
            line.push_str(&format!("      {}\n", error_line));
        }
    }
    if let Some(origin) = case.caused_by {
        line.push_str(&format!(
            "      {}\n",
            style(format!("caused by step {}", origin)).italic()
        ));
    }
    line
}

/// Render plan entries as text, one line per step in topological order
pub fn render_plan_text(entries: &[PlanEntry]) -> String {
    let mut output = format!("{}\n", style("Verification Plan").bold());

    for (index, entry) in entries.iter().enumerate() {
        let waits_on = if entry.predecessors.is_empty() {
            String::new()
        } else {
            let names: Vec<String> = entry.predecessors.iter().map(|p| p.to_string()).collect();
            format!(" <- {}", names.join(", "))
        };
        let fatal = if entry.fatal {
            format!(" {}", style("[fatal]").yellow())
        } else {
            String::new()
        };
        output.push_str(&format!(
            "  {:>2}. {} ({}){}{}\n",
            index + 1,
            entry.name,
            entry.step,
            fatal,
            waits_on
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use actverify_core::errors::{ExecutionError, StepFailure};
    use actverify_core::graph::StepId;
    use actverify_core::lifecycle::ActionPhase::Main;
    use std::time::Duration;

    fn failing_report() -> SuiteReport {
        let failure = StepFailure::new(
            StepId::Execute(Main),
            ExecutionError::NonZeroExit {
                code: 2,
                output: "stdout > partial\nstderr > boom".to_string(),
            },
        );
        SuiteReport::new(
            "dist/action.yml".to_string(),
            vec![
                CaseReport::passed(
                    StepId::ManifestExists,
                    "action.yml exists".to_string(),
                    Duration::from_millis(1),
                ),
                CaseReport::failed(
                    StepId::Execute(Main),
                    "can run runs.main".to_string(),
                    failure.clone(),
                    Duration::from_millis(12),
                ),
                CaseReport::failed(
                    StepId::VerifyOutput(Main),
                    "runs.main has expected output".to_string(),
                    failure,
                    Duration::ZERO,
                ),
            ],
        )
    }

    #[test]
    fn test_render_report_text() {
        console::set_colors_enabled(false);
        let text = render_report_text(&failing_report());

        assert!(text.starts_with("Action Verification (dist/action.yml)"));
        assert!(text.contains("[OK] action.yml exists: passed"));
        assert!(text.contains("[X] can run runs.main: FAILED (12 ms)"));
        assert!(text.contains("      Execution error: Exit code: 2"));
        assert!(text.contains("      stderr > boom"));
        assert!(text.contains("caused by step execute:main"));
        assert!(text.contains("Summary: 1 passed, 2 failed, 0 not run"));
    }

    #[test]
    fn test_origin_case_has_no_caused_by_line() {
        console::set_colors_enabled(false);
        let report = failing_report();
        let text = render_case(&report.cases[1]);
        assert!(!text.contains("caused by"));
    }

    #[test]
    fn test_render_plan_text() {
        console::set_colors_enabled(false);
        let entries = vec![
            PlanEntry {
                step: StepId::ManifestExists,
                name: "action.yml exists".to_string(),
                fatal: true,
                predecessors: Vec::new(),
            },
            PlanEntry {
                step: StepId::ReadManifest,
                name: "can read action.yml".to_string(),
                fatal: false,
                predecessors: vec![StepId::ManifestExists],
            },
        ];

        let text = render_plan_text(&entries);
        assert!(text.contains(" 1. action.yml exists (manifest-exists) [fatal]"));
        assert!(text.contains(" 2. can read action.yml (read-manifest) <- manifest-exists"));
    }
}

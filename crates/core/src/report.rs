//! Suite report
//!
//! One [`CaseReport`] per step, in graph declaration order, plus the
//! aggregated verdict. Serializes to camelCase JSON for machine consumers.

use crate::errors::StepFailure;
use crate::graph::StepId;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one named case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Not attempted because a fatal step failed
    NotRun,
}

impl CaseStatus {
    /// Get the status name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::NotRun => "not run",
        }
    }
}

/// Report for one named case
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub step: StepId,
    pub name: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Step where the failure originated, when it differs from this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<StepId>,
    pub duration_ms: u64,
    #[serde(skip)]
    failure: Option<StepFailure>,
}

impl CaseReport {
    pub fn passed(step: StepId, name: String, duration: Duration) -> Self {
        Self {
            step,
            name,
            status: CaseStatus::Passed,
            error: None,
            caused_by: None,
            duration_ms: duration.as_millis() as u64,
            failure: None,
        }
    }

    pub fn failed(step: StepId, name: String, failure: StepFailure, duration: Duration) -> Self {
        let caused_by = failure.origin().filter(|origin| *origin != step);
        Self {
            step,
            name,
            status: CaseStatus::Failed,
            error: Some(failure.to_string()),
            caused_by,
            duration_ms: duration.as_millis() as u64,
            failure: Some(failure),
        }
    }

    pub fn not_run(step: StepId, name: String) -> Self {
        Self {
            step,
            name,
            status: CaseStatus::NotRun,
            error: None,
            caused_by: None,
            duration_ms: 0,
            failure: None,
        }
    }

    /// The shared failure, for failed cases
    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }
}

/// Aggregated result of a suite run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub manifest: String,
    pub passed: bool,
    /// A fatal step failed and the remaining cases were not attempted
    pub aborted: bool,
    pub cases: Vec<CaseReport>,
    pub summary: SuiteSummary,
}

/// Case counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
}

impl SuiteReport {
    pub fn new(manifest: String, cases: Vec<CaseReport>) -> Self {
        let summary = cases
            .iter()
            .fold(SuiteSummary::default(), |mut acc, case| {
                acc.total += 1;
                match case.status {
                    CaseStatus::Passed => acc.passed += 1,
                    CaseStatus::Failed => acc.failed += 1,
                    CaseStatus::NotRun => acc.not_run += 1,
                }
                acc
            });

        Self {
            manifest,
            passed: summary.failed == 0 && summary.not_run == 0,
            aborted: summary.not_run > 0,
            cases,
            summary,
        }
    }

    pub fn case(&self, step: StepId) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.step == step)
    }

    pub fn status(&self, step: StepId) -> Option<CaseStatus> {
        self.case(step).map(|c| c.status)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases
            .iter()
            .filter(|c| c.status == CaseStatus::Failed)
    }
}

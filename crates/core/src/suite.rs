//! Lifecycle test orchestrator
//!
//! Runs the battery of checks that validates an action's build artifact end to
//! end: manifest presence, readability and parseability, schema checks, and for
//! each lifecycle phase entry-point resolution, existence, execution, and
//! output verification.
//!
//! Each step owns one [`Deferred`] cell that it settles exactly once with its
//! outcome. Steps run concurrently on the calling task and are ordered only by
//! awaiting the cells of their declared predecessors in the [`StepGraph`]. A
//! failed step settles its cell with the failure, so every dependent fails
//! with the same cause instead of waiting forever.

use crate::config::HarnessConfig;
use crate::deferred::{deferred, Deferred, Settler};
use crate::errors::{
    AssertionError, HarnessError, InternalError, ManifestError, Result, StepFailure,
};
use crate::graph::{StepGraph, StepId};
use crate::lifecycle::{run_entry_point, ExecutionContext, ExecutionResult};
use crate::manifest::Manifest;
use crate::report::{CaseReport, CaseStatus, SuiteReport};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, info, warn, Instrument};

/// Value a step settles its cell with
#[derive(Debug, Clone)]
pub enum StepValue {
    /// The check passed and carries no value
    Done,
    /// Manifest text
    Text(Arc<str>),
    /// Parsed manifest
    Manifest(Arc<Manifest>),
    /// Resolved entry-point path
    Path(PathBuf),
    /// Captured execution of an entry point
    Execution(Arc<ExecutionResult>),
}

impl StepValue {
    fn kind(&self) -> &'static str {
        match self {
            StepValue::Done => "no value",
            StepValue::Text(_) => "text",
            StepValue::Manifest(_) => "a manifest",
            StepValue::Path(_) => "a path",
            StepValue::Execution(_) => "an execution result",
        }
    }
}

/// Outcome a step settles its cell with
pub type StepOutcome = std::result::Result<StepValue, StepFailure>;

type Cell = Deferred<StepValue, StepFailure>;

/// A running step's read access to its declared predecessors
pub struct StepContext<'a> {
    step: StepId,
    graph: &'a StepGraph,
    cells: &'a HashMap<StepId, Cell>,
}

impl<'a> StepContext<'a> {
    fn new(step: StepId, graph: &'a StepGraph, cells: &'a HashMap<StepId, Cell>) -> Self {
        Self { step, graph, cells }
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    /// Attribute a freshly produced error to this step
    pub fn fail(&self, error: impl Into<HarnessError>) -> StepFailure {
        StepFailure::new(self.step, error)
    }

    /// Wait for every declared predecessor in declaration order.
    ///
    /// Returns the first failure encountered, unchanged.
    pub async fn await_predecessors(&self) -> std::result::Result<(), StepFailure> {
        for pred in self.graph.predecessors(self.step) {
            self.input(*pred).await?;
        }
        Ok(())
    }

    /// Outcome of a declared predecessor
    pub async fn input(&self, pred: StepId) -> StepOutcome {
        let declared = self.graph.predecessors(self.step).contains(&pred);
        let cell = self
            .cells
            .get(&pred)
            .filter(|_| declared)
            .ok_or_else(|| {
                self.fail(InternalError::UndeclaredDependency {
                    step: self.step.to_string(),
                    requested: pred.to_string(),
                })
            })?;
        cell.wait().await
    }

    async fn value<T>(
        &self,
        pred: StepId,
        expected: &'static str,
        extract: impl FnOnce(StepValue) -> Option<T>,
    ) -> std::result::Result<T, StepFailure> {
        let value = self.input(pred).await?;
        let found = value.kind();
        extract(value).ok_or_else(|| {
            self.fail(InternalError::UnexpectedValue {
                step: pred.to_string(),
                expected,
                found,
            })
        })
    }

    pub async fn text(&self, pred: StepId) -> std::result::Result<Arc<str>, StepFailure> {
        self.value(pred, "text", |v| match v {
            StepValue::Text(text) => Some(text),
            _ => None,
        })
        .await
    }

    pub async fn manifest(&self, pred: StepId) -> std::result::Result<Arc<Manifest>, StepFailure> {
        self.value(pred, "a manifest", |v| match v {
            StepValue::Manifest(manifest) => Some(manifest),
            _ => None,
        })
        .await
    }

    pub async fn path(&self, pred: StepId) -> std::result::Result<PathBuf, StepFailure> {
        self.value(pred, "a path", |v| match v {
            StepValue::Path(path) => Some(path),
            _ => None,
        })
        .await
    }

    pub async fn execution(
        &self,
        pred: StepId,
    ) -> std::result::Result<Arc<ExecutionResult>, StepFailure> {
        self.value(pred, "an execution result", |v| match v {
            StepValue::Execution(result) => Some(result),
            _ => None,
        })
        .await
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// End-to-end verification suite for one action build artifact
#[derive(Debug, Clone)]
pub struct LifecycleSuite {
    config: HarnessConfig,
    graph: StepGraph,
    exec_ctx: ExecutionContext,
}

impl LifecycleSuite {
    /// Validate the configuration and build the step graph
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let graph = StepGraph::for_phases(&config.phases())?;
        let exec_ctx = config.execution_context();
        Ok(Self {
            config,
            graph,
            exec_ctx,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Human-readable case name for a step
    pub fn case_name(&self, step: StepId) -> String {
        let manifest = &self.config.manifest_file;
        match step {
            StepId::ManifestExists => format!("{} exists", manifest),
            StepId::ReadManifest => format!("can read {}", manifest),
            StepId::ParseManifest => format!("{} has valid yaml", manifest),
            StepId::CheckRunsUsing => format!("{} has correct runs.using", manifest),
            StepId::CheckEntryPoint(p) => format!("{} has runs.{}", manifest, p),
            StepId::ResolveEntryPoint(p) => format!("resolve runs.{}", p),
            StepId::EntryPointExists(p) => format!("runs.{} exists", p),
            StepId::Execute(p) => format!("can run runs.{}", p),
            StepId::VerifyOutput(p) => format!("runs.{} has expected output", p),
        }
    }

    /// Run every step and collect one case per step in declaration order.
    ///
    /// Fatal steps run first, one at a time; if any fails, the remaining
    /// cases are reported as not run. All other steps then run concurrently
    /// on the current task.
    pub async fn run(&self) -> SuiteReport {
        let manifest_path = self.config.manifest_path();
        info!("Verifying action artifact at {}", manifest_path.display());

        let mut cells: HashMap<StepId, Cell> = HashMap::new();
        let mut settlers: HashMap<StepId, Settler<StepValue, StepFailure>> = HashMap::new();
        for node in self.graph.nodes() {
            let (settler, cell) = deferred();
            cells.insert(node.id, cell);
            settlers.insert(node.id, settler);
        }

        let mut reports: HashMap<StepId, CaseReport> = HashMap::new();
        let mut aborted = false;
        for id in self.graph.fatal_steps() {
            let ctx = StepContext::new(id, &self.graph, &cells);
            let Some(settler) = settlers.remove(&id) else {
                continue;
            };
            let report = self.execute(ctx, settler).await;
            if report.status == CaseStatus::Failed {
                warn!("Fatal step `{}` failed; skipping remaining cases", id);
                aborted = true;
            }
            reports.insert(id, report);
        }

        if !aborted {
            let pending: Vec<_> = self
                .graph
                .nodes()
                .iter()
                .filter(|node| !node.fatal)
                .filter_map(|node| {
                    let settler = settlers.remove(&node.id)?;
                    let ctx = StepContext::new(node.id, &self.graph, &cells);
                    Some(self.execute(ctx, settler))
                })
                .collect();

            for report in join_all(pending).await {
                reports.insert(report.step, report);
            }
        }

        let cases = self
            .graph
            .nodes()
            .iter()
            .map(|node| {
                reports
                    .remove(&node.id)
                    .unwrap_or_else(|| CaseReport::not_run(node.id, self.case_name(node.id)))
            })
            .collect();

        let report = SuiteReport::new(manifest_path.display().to_string(), cases);
        info!(
            "Suite finished: {} passed, {} failed, {} not run",
            report.summary.passed, report.summary.failed, report.summary.not_run
        );
        report
    }

    /// Run one step, settle its cell, and report the outcome
    async fn execute(
        &self,
        ctx: StepContext<'_>,
        settler: Settler<StepValue, StepFailure>,
    ) -> CaseReport {
        let step = ctx.step();
        let name = self.case_name(step);
        let span = debug_span!("step", step = %step);

        async move {
            let start_time = Instant::now();
            let outcome = match ctx.await_predecessors().await {
                Ok(()) => {
                    debug!("Starting `{}`", name);
                    self.run_step(&ctx).await
                }
                Err(failure) => Err(failure),
            };
            settler.settle(outcome.clone());
            let duration = start_time.elapsed();

            match outcome {
                Ok(_) => {
                    debug!("Passed `{}` in {:?}", name, duration);
                    CaseReport::passed(step, name, duration)
                }
                Err(failure) => {
                    match failure.origin() {
                        Some(origin) if origin != step => {
                            debug!("`{}` failed because `{}` failed", name, origin)
                        }
                        _ => warn!("Failed `{}`: {}", name, failure),
                    }
                    CaseReport::failed(step, name, failure, duration)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_step(&self, ctx: &StepContext<'_>) -> StepOutcome {
        let manifest_path = self.config.manifest_path();

        match ctx.step() {
            StepId::ManifestExists => {
                if path_exists(&manifest_path).await {
                    Ok(StepValue::Done)
                } else {
                    Err(ctx.fail(ManifestError::NotFound {
                        path: manifest_path.display().to_string(),
                    }))
                }
            }
            StepId::ReadManifest => {
                let contents = tokio::fs::read_to_string(&manifest_path)
                    .await
                    .map_err(|source| {
                        ctx.fail(ManifestError::Io {
                            path: manifest_path.display().to_string(),
                            source,
                        })
                    })?;
                if contents.is_empty() {
                    return Err(ctx.fail(ManifestError::Empty {
                        path: manifest_path.display().to_string(),
                    }));
                }
                Ok(StepValue::Text(Arc::from(contents)))
            }
            StepId::ParseManifest => {
                let text = ctx.text(StepId::ReadManifest).await?;
                let manifest = Manifest::parse(&text).map_err(|e| ctx.fail(e))?;
                Ok(StepValue::Manifest(Arc::new(manifest)))
            }
            StepId::CheckRunsUsing => {
                let manifest = ctx.manifest(StepId::ParseManifest).await?;
                manifest
                    .check_runtime_family(&self.config.runtime_family)
                    .map_err(|e| ctx.fail(e))?;
                Ok(StepValue::Done)
            }
            StepId::CheckEntryPoint(phase) => {
                let manifest = ctx.manifest(StepId::ParseManifest).await?;
                manifest.entry_point(phase).map_err(|e| ctx.fail(e))?;
                Ok(StepValue::Done)
            }
            StepId::ResolveEntryPoint(phase) => {
                let manifest = ctx.manifest(StepId::ParseManifest).await?;
                let path = manifest
                    .resolve_entry_point(phase, &self.config.dist_dir)
                    .map_err(|e| ctx.fail(e))?;
                Ok(StepValue::Path(path))
            }
            StepId::EntryPointExists(phase) => {
                let path = ctx.path(StepId::ResolveEntryPoint(phase)).await?;
                if path_exists(&path).await {
                    Ok(StepValue::Done)
                } else {
                    Err(ctx.fail(ManifestError::EntryPointNotFound {
                        phase,
                        path: path.display().to_string(),
                    }))
                }
            }
            StepId::Execute(phase) => {
                let path = ctx.path(StepId::ResolveEntryPoint(phase)).await?;
                let result = run_entry_point(phase, &path, &self.exec_ctx)
                    .await
                    .map_err(|e| ctx.fail(e))?;
                Ok(StepValue::Execution(Arc::new(result)))
            }
            StepId::VerifyOutput(phase) => {
                let result = ctx.execution(StepId::Execute(phase)).await?;
                let actual = result.combined_output();
                if actual == self.config.expected_output {
                    Ok(StepValue::Done)
                } else {
                    Err(ctx.fail(AssertionError::OutputMismatch {
                        expected: self.config.expected_output.clone(),
                        actual,
                        transcript: result.transcript(),
                    }))
                }
            }
        }
    }
}

/// Build a suite from `config` and run it
pub async fn run_suite(config: HarnessConfig) -> Result<SuiteReport> {
    let suite = LifecycleSuite::new(config)?;
    Ok(suite.run().await)
}

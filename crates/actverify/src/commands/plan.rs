//! Plan command implementation
//!
//! Implements `actverify plan`: prints the suite's steps in topological order
//! with the predecessors each one waits on. Nothing is read from the dist
//! directory.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use actverify_core::graph::StepId;
use actverify_core::suite::LifecycleSuite;

use super::load_base_config;
use crate::cli::OutputFormat;
use crate::ui::report::render_plan_text;

/// Plan command arguments
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub config_path: Option<PathBuf>,
    pub post: bool,
    pub output: OutputFormat,
}

/// One step of the plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub step: StepId,
    pub name: String,
    pub fatal: bool,
    pub predecessors: Vec<StepId>,
}

/// Execute the plan command
pub fn execute_plan(args: PlanArgs) -> Result<()> {
    let mut config = load_base_config(args.config_path.as_deref())?;
    if args.post {
        config.check_post = true;
    }

    let suite = LifecycleSuite::new(config)?;
    let entries = plan_entries(&suite);

    match args.output {
        OutputFormat::Text => print!("{}", render_plan_text(&entries)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

/// Steps in topological order
pub fn plan_entries(suite: &LifecycleSuite) -> Vec<PlanEntry> {
    let graph = suite.graph();
    graph
        .topological_order()
        .iter()
        .filter_map(|id| graph.node(*id))
        .map(|node| PlanEntry {
            step: node.id,
            name: suite.case_name(node.id),
            fatal: node.fatal,
            predecessors: node.predecessors.clone(),
        })
        .collect()
}

//! Step dependency graph
//!
//! Every check in a suite is a named step with declared predecessors. A step
//! may only observe the outcome of steps it declares, and it does not begin
//! observable work until all of them have settled. The graph is validated on
//! construction: ids are unique, predecessors exist, fatal steps stand alone,
//! and there are no cycles.
//!
//! The rule that the `post` phase runs only after `main` has completed is an
//! edge here: `Execute(Post)` declares `VerifyOutput(Main)` as a predecessor.

use crate::errors::InternalError;
use crate::lifecycle::ActionPhase;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Identity of a suite step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepId {
    /// Manifest file is present
    ManifestExists,
    /// Manifest file is readable and non-empty
    ReadManifest,
    /// Manifest parses to a structured document
    ParseManifest,
    /// `runs.using` names the expected runtime family
    CheckRunsUsing,
    /// `runs.<phase>` is present and a string
    CheckEntryPoint(ActionPhase),
    /// `runs.<phase>` joined onto the build output directory
    ResolveEntryPoint(ActionPhase),
    /// The resolved entry point exists on disk
    EntryPointExists(ActionPhase),
    /// The entry point runs and exits with code zero
    Execute(ActionPhase),
    /// The entry point's output equals the sentinel
    VerifyOutput(ActionPhase),
}

impl StepId {
    /// Lifecycle phase this step belongs to, if any
    pub fn phase(&self) -> Option<ActionPhase> {
        match self {
            StepId::CheckEntryPoint(p)
            | StepId::ResolveEntryPoint(p)
            | StepId::EntryPointExists(p)
            | StepId::Execute(p)
            | StepId::VerifyOutput(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::ManifestExists => f.write_str("manifest-exists"),
            StepId::ReadManifest => f.write_str("read-manifest"),
            StepId::ParseManifest => f.write_str("parse-manifest"),
            StepId::CheckRunsUsing => f.write_str("check-runs-using"),
            StepId::CheckEntryPoint(p) => write!(f, "check-entry-point:{}", p),
            StepId::ResolveEntryPoint(p) => write!(f, "resolve-entry-point:{}", p),
            StepId::EntryPointExists(p) => write!(f, "entry-point-exists:{}", p),
            StepId::Execute(p) => write!(f, "execute:{}", p),
            StepId::VerifyOutput(p) => write!(f, "verify-output:{}", p),
        }
    }
}

impl Serialize for StepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A step and the steps it waits on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub id: StepId,
    /// Awaited in this order before the step does any work
    pub predecessors: Vec<StepId>,
    /// A fatal step runs before all others; its failure aborts the suite
    pub fatal: bool,
}

impl StepNode {
    pub fn new(id: StepId, predecessors: Vec<StepId>) -> Self {
        Self {
            id,
            predecessors,
            fatal: false,
        }
    }

    pub fn fatal(id: StepId) -> Self {
        Self {
            id,
            predecessors: Vec::new(),
            fatal: true,
        }
    }
}

/// Validated, acyclic step graph
#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
    index: HashMap<StepId, usize>,
    order: Vec<StepId>,
}

impl StepGraph {
    /// Build and validate a graph from nodes in declaration order
    pub fn new(nodes: Vec<StepNode>) -> Result<Self, InternalError> {
        let invalid = |message: String| InternalError::InvalidGraph { message };

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id, i).is_some() {
                return Err(invalid(format!("step `{}` is declared twice", node.id)));
            }
        }

        for node in &nodes {
            if node.fatal && !node.predecessors.is_empty() {
                return Err(invalid(format!(
                    "fatal step `{}` cannot have predecessors",
                    node.id
                )));
            }
            for pred in &node.predecessors {
                if !index.contains_key(pred) {
                    return Err(invalid(format!(
                        "step `{}` depends on undeclared step `{}`",
                        node.id, pred
                    )));
                }
                if *pred == node.id {
                    return Err(invalid(format!("step `{}` depends on itself", node.id)));
                }
            }
        }

        let order = topological_order(&nodes, &index).ok_or_else(|| {
            invalid("dependency cycle detected".to_string())
        })?;

        Ok(Self {
            nodes,
            index,
            order,
        })
    }

    /// Standard lifecycle suite covering `phases` (`main` is always included)
    pub fn for_phases(phases: &[ActionPhase]) -> Result<Self, InternalError> {
        let mut phases: Vec<ActionPhase> = phases.to_vec();
        phases.push(ActionPhase::Main);
        phases.sort();
        phases.dedup();

        let mut nodes = vec![
            StepNode::fatal(StepId::ManifestExists),
            StepNode::new(StepId::ReadManifest, vec![]),
            StepNode::new(StepId::ParseManifest, vec![StepId::ReadManifest]),
            StepNode::new(StepId::CheckRunsUsing, vec![StepId::ParseManifest]),
        ];

        for phase in phases {
            nodes.push(StepNode::new(
                StepId::CheckEntryPoint(phase),
                vec![StepId::ParseManifest],
            ));
            nodes.push(StepNode::new(
                StepId::ResolveEntryPoint(phase),
                vec![StepId::ParseManifest],
            ));
            nodes.push(StepNode::new(
                StepId::EntryPointExists(phase),
                vec![StepId::ResolveEntryPoint(phase)],
            ));
            let execute_preds = match phase {
                ActionPhase::Main => vec![StepId::ResolveEntryPoint(phase)],
                // post waits for main to complete before launching
                ActionPhase::Post => vec![
                    StepId::VerifyOutput(ActionPhase::Main),
                    StepId::ResolveEntryPoint(phase),
                ],
            };
            nodes.push(StepNode::new(StepId::Execute(phase), execute_preds));
            nodes.push(StepNode::new(
                StepId::VerifyOutput(phase),
                vec![StepId::Execute(phase)],
            ));
        }

        Self::new(nodes)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn node(&self, id: StepId) -> Option<&StepNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.index.contains_key(&id)
    }

    /// Declared predecessors of `id` (empty for unknown steps)
    pub fn predecessors(&self, id: StepId) -> &[StepId] {
        self.node(id).map(|n| n.predecessors.as_slice()).unwrap_or(&[])
    }

    /// Steps in an order where every step follows its predecessors
    pub fn topological_order(&self) -> &[StepId] {
        &self.order
    }

    pub fn fatal_steps(&self) -> impl Iterator<Item = StepId> + '_ {
        self.nodes.iter().filter(|n| n.fatal).map(|n| n.id)
    }
}

/// Kahn's algorithm, ties broken by declaration order. `None` on a cycle.
fn topological_order(nodes: &[StepNode], index: &HashMap<StepId, usize>) -> Option<Vec<StepId>> {
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.predecessors.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for pred in &node.predecessors {
            dependents[index[pred]].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_front() {
        order.push(nodes[i].id);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    (order.len() == nodes.len()).then_some(order)
}

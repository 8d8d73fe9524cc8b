//! Process chain detection
//!
//! Works on the subgraph induced by process nodes and material streams.
//! A chain is a maximal directed path in that subgraph; its emission is the
//! sum of `flow_rate × carbon_intensity` over its streams.
//!
//! # Branch points
//!
//! A process with more than one incoming or more than one outgoing material
//! stream cannot sit inside a single linear chain. Such nodes are skipped and
//! reported; the well-defined runs on either side are still emitted. Runs that
//! close on themselves (pure cycles) have no endpoints and are reported too.

use cbam_graph::{ChainId, GraphStore, NodeId, NodeKind, ProcessChain, StreamKind};
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Chain detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum number of processes for a run to count as a chain
    pub min_chain_length: usize,
}

impl DetectionConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_min_chain_length(mut self, len: usize) -> Self {
        self.min_chain_length = len.max(1);
        self
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { min_chain_length: 2 }
    }
}

/// A branch point that could not be resolved into a single linear chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionAmbiguous {
    pub node_id: NodeId,
    pub incoming: usize,
    pub outgoing: usize,
}

/// Full detection output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub chains: Vec<ProcessChain>,
    pub ambiguous: Vec<DetectionAmbiguous>,
    /// Closed runs of processes, listed from their first node in store order
    pub cycles: Vec<Vec<NodeId>>,
}

/// Scans a graph for process chains
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainDetectionEngine {
    config: DetectionConfig,
}

/// Material subgraph over process nodes; weights index back into the store
struct MaterialGraph<'a> {
    graph: DiGraph<&'a NodeId, Option<f64>>,
    branch: Vec<bool>,
}

impl<'a> MaterialGraph<'a> {
    fn build(store: &'a GraphStore) -> Self {
        let mut graph: DiGraph<&'a NodeId, Option<f64>> = DiGraph::new();
        let mut index = std::collections::HashMap::new();
        for node in store.nodes_of_kind(NodeKind::Process) {
            index.insert(&node.id, graph.add_node(&node.id));
        }
        for edge in store.edges() {
            if edge.stream.kind != StreamKind::Material {
                continue;
            }
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(s, t, edge.stream.emission());
            }
        }
        let branch = graph
            .node_indices()
            .map(|n| {
                graph.edges_directed(n, Direction::Incoming).count() > 1
                    || graph.edges_directed(n, Direction::Outgoing).count() > 1
            })
            .collect();
        Self { graph, branch }
    }

    fn is_branch(&self, n: NodeIndex) -> bool {
        self.branch[n.index()]
    }

    /// Next hop along a linear run, if the successor is not a branch point
    fn next(&self, n: NodeIndex) -> Option<(EdgeIndex, NodeIndex)> {
        let edge = self.graph.edges_directed(n, Direction::Outgoing).next()?;
        (!self.is_branch(edge.target())).then(|| (edge.id(), edge.target()))
    }

    fn has_linear_predecessor(&self, n: NodeIndex) -> bool {
        self.graph
            .edges_directed(n, Direction::Incoming)
            .any(|e| !self.is_branch(e.source()))
    }
}

impl ChainDetectionEngine {
    #[inline]
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Detect chains, discarding the ambiguity report
    #[must_use]
    pub fn detect(&self, store: &GraphStore) -> Vec<ProcessChain> {
        self.detect_with_report(store).chains
    }

    /// Detect chains and report skipped branch points and cycles
    #[must_use]
    pub fn detect_with_report(&self, store: &GraphStore) -> DetectionReport {
        self.detect_at(store, Utc::now())
    }

    /// Detect chains stamped with `created_at`
    ///
    /// Chains are ordered by the store order of their start process, so an
    /// unchanged graph at a fixed timestamp always yields equal reports.
    #[must_use]
    pub fn detect_at(&self, store: &GraphStore, created_at: DateTime<Utc>) -> DetectionReport {
        let mg = MaterialGraph::build(store);
        let mut report = DetectionReport::default();
        let mut visited: HashSet<NodeIndex> = HashSet::new();

        for n in mg.graph.node_indices() {
            if mg.is_branch(n) {
                let ambiguous = DetectionAmbiguous {
                    node_id: mg.graph[n].clone(),
                    incoming: mg.graph.edges_directed(n, Direction::Incoming).count(),
                    outgoing: mg.graph.edges_directed(n, Direction::Outgoing).count(),
                };
                tracing::warn!(
                    node = %ambiguous.node_id,
                    incoming = ambiguous.incoming,
                    outgoing = ambiguous.outgoing,
                    "branch point skipped during chain detection"
                );
                report.ambiguous.push(ambiguous);
            }
        }

        for start in mg.graph.node_indices() {
            if mg.is_branch(start) || visited.contains(&start) || mg.has_linear_predecessor(start) {
                continue;
            }
            let mut path = vec![start];
            let mut segments: Vec<Option<f64>> = Vec::new();
            let mut current = start;
            visited.insert(start);
            while let Some((edge, next)) = mg.next(current) {
                segments.push(mg.graph[edge]);
                path.push(next);
                visited.insert(next);
                current = next;
            }
            if path.len() >= self.config.min_chain_length {
                let ids: Vec<NodeId> = path.iter().map(|&i| mg.graph[i].clone()).collect();
                report.chains.push(make_chain(store, ids, &segments, created_at));
            }
        }

        // Whatever is left unvisited lies on a closed run.
        for n in mg.graph.node_indices() {
            if mg.is_branch(n) || visited.contains(&n) {
                continue;
            }
            let mut cycle = Vec::new();
            let mut current = n;
            while visited.insert(current) {
                cycle.push(mg.graph[current].clone());
                match mg.next(current) {
                    Some((_, next)) => current = next,
                    None => break,
                }
            }
            tracing::warn!(length = cycle.len(), "material cycle skipped during chain detection");
            report.cycles.push(cycle);
        }

        tracing::info!(
            chains = report.chains.len(),
            ambiguous = report.ambiguous.len(),
            cycles = report.cycles.len(),
            "chain detection finished"
        );
        report
    }
}

fn make_chain(
    store: &GraphStore,
    process_ids: Vec<NodeId>,
    segments: &[Option<f64>],
    created_at: DateTime<Utc>,
) -> ProcessChain {
    let label = |id: &NodeId| {
        store
            .node(id)
            .map(|n| n.data.label())
            .filter(|l| !l.is_empty())
            .map_or_else(|| id.to_string(), str::to_string)
    };
    // Any unknown intensity makes the whole figure provisional.
    let total_emission = segments.iter().copied().sum::<Option<f64>>();
    let start = process_ids[0].clone();
    let end = process_ids[process_ids.len() - 1].clone();
    ProcessChain {
        id: ChainId::for_path(&process_ids),
        name: format!("{} → {}", label(&start), label(&end)),
        chain_length: process_ids.len(),
        start_process_id: start,
        end_process_id: end,
        total_emission,
        is_active: true,
        created_at,
        process_ids,
    }
}

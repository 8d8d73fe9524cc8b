use anyhow::{Context, Result};
use cbam_analysis::{ChainDetectionEngine, DetectionReport, LayoutEngine};
use cbam_canvas::{FlowConfig, FlowSnapshot};
use cbam_graph::{GraphStore, GroupAggregator, NodeId, Position, RolledUpMetrics};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of loading a flow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub nodes_loaded: usize,
    pub edges_loaded: usize,
    pub issues: Vec<String>,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Computed node positions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutReport {
    pub positions: BTreeMap<NodeId, Position>,
    pub layer_count: usize,
    pub width: f64,
    pub height: f64,
}

/// Parse an exported flow file
pub fn read_flow(path: &Path) -> Result<FlowSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: FlowSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a flow export", path.display()))?;
    tracing::debug!(
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "flow read"
    );
    Ok(snapshot)
}

fn hydrate(snapshot: &FlowSnapshot) -> (GraphStore, cbam_graph::HydrationReport) {
    GraphStore::hydrate(snapshot.nodes.clone(), snapshot.edges.clone())
}

/// Hydrate and list every dropped or repaired record
#[must_use]
pub fn check(snapshot: &FlowSnapshot) -> CheckReport {
    let (_, report) = hydrate(snapshot);
    CheckReport {
        nodes_loaded: report.nodes_loaded,
        edges_loaded: report.edges_loaded,
        issues: report.issues.iter().map(ToString::to_string).collect(),
    }
}

/// Detect process chains
#[must_use]
pub fn detect(snapshot: &FlowSnapshot, config: &FlowConfig) -> DetectionReport {
    let (store, _) = hydrate(snapshot);
    ChainDetectionEngine::new(config.detection).detect_with_report(&store)
}

/// Lay out the visible nodes
pub fn layout(snapshot: &FlowSnapshot, config: &FlowConfig) -> Result<LayoutReport> {
    let (store, _) = hydrate(snapshot);
    let hidden = GroupAggregator::new().hidden_nodes(&store);
    let result = LayoutEngine::new(config.layout).layout_store(&store, &hidden)?;
    Ok(LayoutReport {
        positions: result.positions,
        layer_count: result.layer_count,
        width: result.width,
        height: result.height,
    })
}

/// Sum member metrics of `group`
pub fn rollup(snapshot: &FlowSnapshot, group: &str) -> Result<RolledUpMetrics> {
    let (store, _) = hydrate(snapshot);
    let metrics = GroupAggregator::new()
        .roll_up(&store, &NodeId::new(group))
        .with_context(|| format!("cannot roll up group {group}"))?;
    Ok(metrics)
}

//! Layered auto-layout
//!
//! A thin adapter over `dagre-rs`: the visible nodes and their streams go
//! into a petgraph `Graph`, dagre ranks and orders them, and the resulting
//! coordinates are shifted so the top-left node sits on the configured
//! origin.
//!
//! Identical input always produces identical positions.

use cbam_graph::{GraphStore, NodeId, NodeKind, Position};
use dagre_rs::{DagreLayout, LayoutOptions as DagreOptions, RankDir};
use petgraph::graph::{Graph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Layout failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("edge endpoint {0} is not among the nodes to lay out")]
    UnknownNode(NodeId),
}

/// Flow direction of the layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutDirection {
    #[default]
    LeftToRight,
    TopToBottom,
}

impl From<LayoutDirection> for RankDir {
    fn from(direction: LayoutDirection) -> Self {
        match direction {
            LayoutDirection::LeftToRight => RankDir::LeftToRight,
            LayoutDirection::TopToBottom => RankDir::TopToBottom,
        }
    }
}

/// Layout tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub direction: LayoutDirection,
    pub node_width: f64,
    pub node_height: f64,
    /// Space between consecutive layers
    pub layer_gap: f64,
    /// Space between nodes of the same layer
    pub node_gap: f64,
    pub origin: Position,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::LeftToRight,
            node_width: 180.0,
            node_height: 80.0,
            layer_gap: 120.0,
            node_gap: 40.0,
            origin: Position::new(0.0, 0.0),
        }
    }
}

impl LayoutOptions {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_direction(mut self, direction: LayoutDirection) -> Self {
        self.direction = direction;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_node_size(mut self, width: f64, height: f64) -> Self {
        self.node_width = width;
        self.node_height = height;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_gaps(mut self, layer_gap: f64, node_gap: f64) -> Self {
        self.layer_gap = layer_gap;
        self.node_gap = node_gap;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: Position) -> Self {
        self.origin = origin;
        self
    }

    /// Node extent along and across the flow direction
    fn footprint(&self) -> (f64, f64) {
        match self.direction {
            LayoutDirection::LeftToRight => (self.node_width, self.node_height),
            LayoutDirection::TopToBottom => (self.node_height, self.node_width),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_dagre(self) -> DagreOptions {
        let (along, across) = self.footprint();
        DagreOptions {
            rank_dir: self.direction.into(),
            node_sep: (across + self.node_gap) as f32,
            rank_sep: (along + self.layer_gap) as f32,
            ..Default::default()
        }
    }
}

/// Computed placement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub positions: BTreeMap<NodeId, Position>,
    /// Distinct ranks along the flow direction
    pub layer_count: usize,
    /// Extent along x
    pub width: f64,
    /// Extent along y
    pub height: f64,
}

impl LayoutResult {
    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<Position> {
        self.positions.get(id).copied()
    }
}

/// Positions nodes in layers so streams flow in one direction
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutEngine {
    options: LayoutOptions,
}

impl LayoutEngine {
    #[inline]
    #[must_use]
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Lay out the visible part of a store
    ///
    /// Hidden nodes and expanded group containers are left out; a collapsed
    /// group takes part as a single node.
    pub fn layout_store(
        &self,
        store: &GraphStore,
        hidden: &BTreeSet<NodeId>,
    ) -> Result<LayoutResult, LayoutError> {
        let nodes: Vec<NodeId> = store
            .nodes()
            .filter(|n| !hidden.contains(&n.id))
            .filter(|n| n.data.as_group().map_or(true, |g| g.collapsed))
            .filter(|n| n.kind() != NodeKind::Annotation)
            .map(|n| n.id.clone())
            .collect();
        let included: HashSet<&NodeId> = nodes.iter().collect();
        let edges: Vec<(NodeId, NodeId)> = store
            .edges()
            .filter(|e| included.contains(&e.source) && included.contains(&e.target))
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        self.layout(&nodes, &edges)
    }

    /// Compute positions for `nodes`, honouring `edges` as flow direction
    ///
    /// Duplicate nodes, self-loops and parallel edges are ignored.
    ///
    /// # Errors
    /// `UnknownNode` if an edge references a node outside `nodes`
    pub fn layout(
        &self,
        nodes: &[NodeId],
        edges: &[(NodeId, NodeId)],
    ) -> Result<LayoutResult, LayoutError> {
        let mut graph: Graph<usize, ()> = Graph::new();
        let mut index: HashMap<&NodeId, NodeIndex> = HashMap::new();
        let mut ids: Vec<&NodeId> = Vec::new();
        for id in nodes {
            if !index.contains_key(id) {
                index.insert(id, graph.add_node(ids.len()));
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Ok(LayoutResult::default());
        }

        let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for (s, t) in edges {
            let s = *index.get(s).ok_or_else(|| LayoutError::UnknownNode(s.clone()))?;
            let t = *index.get(t).ok_or_else(|| LayoutError::UnknownNode(t.clone()))?;
            if s != t && seen.insert((s, t)) {
                graph.add_edge(s, t, ());
            }
        }

        let computed = DagreLayout::with_options(self.options.to_dagre()).compute(&graph);
        let raw: Option<Vec<(f64, f64)>> = graph
            .node_indices()
            .map(|v| {
                computed
                    .node_positions
                    .get(&v)
                    .map(|&(x, y)| (f64::from(x), f64::from(y)))
            })
            .collect();
        let raw = raw.unwrap_or_else(|| {
            tracing::warn!(nodes = ids.len(), "dagre returned no positions, using a grid");
            self.grid(ids.len())
        });

        let result = self.place(&ids, &raw);
        tracing::debug!(
            nodes = ids.len(),
            layers = result.layer_count,
            "layout computed"
        );
        Ok(result)
    }

    /// Row-major square grid, one cell per node
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn grid(&self, n: usize) -> Vec<(f64, f64)> {
        let o = &self.options;
        let cols = ((n as f64).sqrt().ceil() as usize).max(1);
        (0..n)
            .map(|i| {
                let col = (i % cols) as f64;
                let row = (i / cols) as f64;
                (col * (o.node_width + o.node_gap), row * (o.node_height + o.layer_gap))
            })
            .collect()
    }

    /// Shift raw coordinates onto the origin and measure the result
    #[allow(clippy::cast_possible_truncation)]
    fn place(&self, ids: &[&NodeId], raw: &[(f64, f64)]) -> LayoutResult {
        let o = &self.options;
        let min_x = raw.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let min_y = raw.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_x = raw.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let max_y = raw.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let positions = ids
            .iter()
            .zip(raw)
            .map(|(id, &(x, y))| {
                (
                    (*id).clone(),
                    Position::new(o.origin.x + x - min_x, o.origin.y + y - min_y),
                )
            })
            .collect();

        let ranks: BTreeSet<i64> = raw
            .iter()
            .map(|&(x, y)| match o.direction {
                LayoutDirection::LeftToRight => x.round() as i64,
                LayoutDirection::TopToBottom => y.round() as i64,
            })
            .collect();

        LayoutResult {
            positions,
            layer_count: ranks.len(),
            width: max_x - min_x + o.node_width,
            height: max_y - min_y + o.node_height,
        }
    }
}

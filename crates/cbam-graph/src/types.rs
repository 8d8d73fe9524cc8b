//! Core types for the process graph
//!
//! Defines the canvas vocabulary:
//! - Node and stream identifiers
//! - Connection handles (`<nodeId>-<side>`)
//! - Node payloads per kind (product, process, group, annotation)
//! - Streams (edges) and edge drafts proposed by the UI
//! - Derived process chains

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique node identifier within a canvas
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Wrap an existing id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique stream identifier within a canvas
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    /// Wrap an existing id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Canvas coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Side of a node where a handle is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    /// Wire spelling of the side
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Top => "top",
            Side::Bottom => "bottom",
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            "top" => Ok(Side::Top),
            "bottom" => Ok(Side::Bottom),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<node>.+)-(?P<side>left|right|top|bottom)$").expect("handle pattern is valid")
});

/// Connection anchor of the form `<nodeId>-<side>`
///
/// Node ids may themselves contain `-`, so the side is always taken from
/// the last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub node: NodeId,
    pub side: Side,
}

impl Handle {
    #[inline]
    #[must_use]
    pub fn new(node: impl Into<NodeId>, side: Side) -> Self {
        Self {
            node: node.into(),
            side,
        }
    }

    /// Parse a handle id, returning `None` when it does not match the pattern
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = HANDLE_PATTERN.captures(raw)?;
        let side = caps.name("side")?.as_str().parse().ok()?;
        Some(Self {
            node: NodeId::new(caps.name("node")?.as_str()),
            side,
        })
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.node, self.side)
    }
}

/// Node discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Product,
    Process,
    Group,
    Annotation,
}

impl NodeKind {
    /// Wire spelling of the kind
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Product => "product",
            NodeKind::Process => "process",
            NodeKind::Group => "group",
            NodeKind::Annotation => "annotation",
        }
    }
}

impl FromStr for NodeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(NodeKind::Product),
            "process" => Ok(NodeKind::Process),
            "group" => Ok(NodeKind::Group),
            "annotation" => Ok(NodeKind::Annotation),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CBAM metrics carried by products and processes
///
/// Every field is optional: a node may be placed before its figures are known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CbamMetrics {
    /// tCO2e per unit of output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_intensity: Option<f64>,
    /// Material throughput
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_flow: Option<f64>,
    /// Energy consumption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_consumption: Option<f64>,
}

impl CbamMetrics {
    #[inline]
    #[must_use]
    pub fn new(carbon_intensity: f64, material_flow: f64, energy_consumption: f64) -> Self {
        Self {
            carbon_intensity: Some(carbon_intensity),
            material_flow: Some(material_flow),
            energy_consumption: Some(energy_consumption),
        }
    }
}

/// Where a group sits relative to the installation boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Input,
    Output,
    #[default]
    Internal,
}

/// Payload of a product node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn_code: Option<String>,
    #[serde(flatten)]
    pub metrics: CbamMetrics,
    /// UI fields this core does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload of a process node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessData {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub metrics: CbamMetrics,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload of a group node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub members: BTreeSet<NodeId>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub boundary_kind: BoundaryKind,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GroupData {
    /// Count shown on the group badge
    #[inline]
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Payload of a free-text annotation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Kind-specific node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Product(ProductData),
    Process(ProcessData),
    Group(GroupData),
    Annotation(AnnotationData),
}

impl NodeData {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Product(_) => NodeKind::Product,
            NodeData::Process(_) => NodeKind::Process,
            NodeData::Group(_) => NodeKind::Group,
            NodeData::Annotation(_) => NodeKind::Annotation,
        }
    }

    /// CBAM metrics, for the kinds that carry them
    #[must_use]
    pub fn metrics(&self) -> Option<&CbamMetrics> {
        match self {
            NodeData::Product(p) => Some(&p.metrics),
            NodeData::Process(p) => Some(&p.metrics),
            NodeData::Group(_) | NodeData::Annotation(_) => None,
        }
    }

    pub fn metrics_mut(&mut self) -> Option<&mut CbamMetrics> {
        match self {
            NodeData::Product(p) => Some(&mut p.metrics),
            NodeData::Process(p) => Some(&mut p.metrics),
            NodeData::Group(_) | NodeData::Annotation(_) => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&GroupData> {
        match self {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupData> {
        match self {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Human-readable label (name, group label or annotation text)
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            NodeData::Product(p) => &p.name,
            NodeData::Process(p) => &p.name,
            NodeData::Group(g) => &g.label,
            NodeData::Annotation(a) => &a.text,
        }
    }
}

/// A node on the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
    pub draggable: bool,
    pub selectable: bool,
    pub deletable: bool,
}

impl Node {
    /// Create a node with the default interaction flags
    #[must_use]
    pub fn new(id: impl Into<NodeId>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data,
            draggable: true,
            selectable: true,
            deletable: true,
        }
    }

    #[must_use]
    pub fn process(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeData::Process(ProcessData {
                name: name.into(),
                ..ProcessData::default()
            }),
        )
    }

    #[must_use]
    pub fn product(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeData::Product(ProductData {
                name: name.into(),
                ..ProductData::default()
            }),
        )
    }

    #[must_use]
    pub fn annotation(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeData::Annotation(AnnotationData {
                text: text.into(),
                extra: BTreeMap::new(),
            }),
        )
    }

    #[must_use]
    pub fn group(
        id: impl Into<NodeId>,
        label: impl Into<String>,
        members: impl IntoIterator<Item = NodeId>,
        boundary_kind: BoundaryKind,
    ) -> Self {
        Self::new(
            id,
            NodeData::Group(GroupData {
                label: label.into(),
                members: members.into_iter().collect(),
                collapsed: false,
                boundary_kind,
                extra: BTreeMap::new(),
            }),
        )
    }

    /// Place the node
    #[inline]
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Set CBAM metrics; ignored for kinds without metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: CbamMetrics) -> Self {
        if let Some(m) = self.data.metrics_mut() {
            *m = metrics;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

/// Partial update for [`Node`]; the node kind cannot be changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub position: Option<Position>,
    /// New name, label or annotation text depending on kind
    pub label: Option<String>,
    pub metrics: Option<CbamMetrics>,
    pub draggable: Option<bool>,
    pub selectable: Option<bool>,
    pub deletable: Option<bool>,
}

impl NodePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: CbamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Flow type carried by a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Material,
    Energy,
    Carbon,
    Waste,
}

/// Stream payload, serialized as the edge `data` object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    #[serde(rename = "streamKind", default)]
    pub kind: StreamKind,
    #[serde(default)]
    pub flow_rate: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_intensity: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StreamData {
    #[must_use]
    pub fn new(kind: StreamKind, flow_rate: f64, unit: impl Into<String>) -> Self {
        Self {
            kind,
            flow_rate,
            unit: unit.into(),
            carbon_intensity: None,
            extra: BTreeMap::new(),
        }
    }

    /// `flow_rate × carbon_intensity`, or `None` while the intensity is unknown
    #[must_use]
    pub fn emission(&self) -> Option<f64> {
        self.carbon_intensity.map(|ci| self.flow_rate * ci)
    }
}

/// Default rendering type for streams
pub const DEFAULT_EDGE_TYPE: &str = "default";

/// A stream between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Handle,
    pub target_handle: Handle,
    /// Rendering type, opaque to the core
    pub edge_type: String,
    pub stream: StreamData,
}

impl Edge {
    /// Whether `node` is either endpoint
    #[inline]
    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// Whether the edge joins `a` and `b` in either direction
    #[must_use]
    pub fn joins(&self, a: &NodeId, b: &NodeId) -> bool {
        (&self.source == a && &self.target == b) || (&self.source == b && &self.target == a)
    }

    /// The endpoint opposite `node`
    #[must_use]
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// A proposed connection, as emitted by the editor's connect gesture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeDraft {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    pub edge_type: Option<String>,
    pub stream: StreamData,
}

impl EdgeDraft {
    /// Draft a material stream with right-to-left handles
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            source_handle: Some(Handle::new(source.clone(), Side::Right).to_string()),
            target_handle: Some(Handle::new(target.clone(), Side::Left).to_string()),
            source,
            target,
            edge_type: None,
            stream: StreamData::default(),
        }
    }

    #[must_use]
    pub fn source_handle(mut self, handle: Option<String>) -> Self {
        self.source_handle = handle;
        self
    }

    #[must_use]
    pub fn target_handle(mut self, handle: Option<String>) -> Self {
        self.target_handle = handle;
        self
    }

    /// Anchor both ends on the given sides
    #[must_use]
    pub fn sides(self, source_side: Side, target_side: Side) -> Self {
        let source = Handle::new(self.source.clone(), source_side).to_string();
        let target = Handle::new(self.target.clone(), target_side).to_string();
        self.source_handle(Some(source)).target_handle(Some(target))
    }

    #[must_use]
    pub fn stream(mut self, kind: StreamKind, flow_rate: f64, unit: impl Into<String>) -> Self {
        self.stream.kind = kind;
        self.stream.flow_rate = flow_rate;
        self.stream.unit = unit.into();
        self
    }

    #[must_use]
    pub fn carbon_intensity(mut self, carbon_intensity: f64) -> Self {
        self.stream.carbon_intensity = Some(carbon_intensity);
        self
    }
}

/// Chain identifier, stable for a given path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub Uuid);

impl ChainId {
    /// Derive the id from the ordered process ids of the path
    #[must_use]
    pub fn for_path(path: &[NodeId]) -> Self {
        let joined = path
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join("\u{1f}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, joined.as_bytes()))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximal linear run of process nodes linked by material streams
///
/// Read-only: regenerated wholesale by chain detection, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessChain {
    pub id: ChainId,
    pub name: String,
    pub chain_length: usize,
    pub start_process_id: NodeId,
    pub end_process_id: NodeId,
    /// `None` while any segment lacks a carbon intensity
    pub total_emission: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub process_ids: Vec<NodeId>,
}

impl ProcessChain {
    /// Whether the emission figure is still provisional
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.total_emission.is_none()
    }
}

//! Canonical node/stream storage for one canvas
//!
//! `GraphStore` keeps nodes and streams in insertion order so every query
//! (and every algorithm built on top of it) is deterministic.
//!
//! # Invariants
//! - node ids are unique
//! - every stream's `source` and `target` exist and differ
//! - at most one stream of a given kind joins any unordered node pair
//! - group members exist, are not groups, and never include the group itself
//! - a node belongs to at most one group

use crate::error::{EdgeEnd, GraphError, GraphIntegrityError, GroupError};
use crate::types::{
    Edge, EdgeDraft, EdgeId, GroupData, Node, NodeData, NodeId, NodeKind, NodePatch, Position,
    StreamKind,
};
use crate::validator::{ConnectionValidator, ValidatorConfig};
use crate::wire::{EdgeRecord, NodeRecord};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Outcome of [`GraphStore::hydrate`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationReport {
    pub nodes_loaded: usize,
    pub edges_loaded: usize,
    /// Records dropped or repaired, in the order they were encountered
    pub issues: Vec<GraphIntegrityError>,
}

impl HydrationReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Owns the nodes and streams of one canvas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
}

impl GraphStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ----- queries -----

    #[inline]
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[inline]
    #[must_use]
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    #[inline]
    #[must_use]
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Streams in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind() == kind)
    }

    /// Streams incident to `node`, in both directions
    pub fn edges_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.touches(node))
    }

    pub fn out_edges<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| &e.source == node)
    }

    pub fn in_edges<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| &e.target == node)
    }

    /// Distinct adjacent nodes, in stream order
    #[must_use]
    pub fn neighbors(&self, node: &NodeId) -> Vec<&NodeId> {
        let mut out: Vec<&NodeId> = Vec::new();
        for edge in self.edges.values() {
            if let Some(other) = edge.other_end(node) {
                if !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        out
    }

    #[must_use]
    pub fn degree(&self, node: &NodeId) -> usize {
        self.edges_of(node).count()
    }

    /// Existing stream joining `a` and `b` in either direction
    ///
    /// With `kind` set, only streams of that kind are considered.
    #[must_use]
    pub fn find_edge_between(
        &self,
        a: &NodeId,
        b: &NodeId,
        kind: Option<StreamKind>,
    ) -> Option<&Edge> {
        self.edges
            .values()
            .find(|e| e.joins(a, b) && kind.map_or(true, |k| e.stream.kind == k))
    }

    /// Group payload of `id`
    pub fn group(&self, id: &NodeId) -> Result<&GroupData, GroupError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GroupError::GroupNotFound(id.clone()))?;
        node.data.as_group().ok_or_else(|| GroupError::NotAGroup {
            id: id.clone(),
            kind: node.kind(),
        })
    }

    pub(crate) fn group_mut(&mut self, id: &NodeId) -> Result<&mut GroupData, GroupError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GroupError::GroupNotFound(id.clone()))?;
        let kind = node.kind();
        node.data.as_group_mut().ok_or_else(|| GroupError::NotAGroup {
            id: id.clone(),
            kind,
        })
    }

    /// Groups that list `node` as a member
    pub fn groups_containing<'a>(
        &'a self,
        node: &'a NodeId,
    ) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.nodes.values().filter_map(move |n| match &n.data {
            NodeData::Group(g) if g.members.contains(node) => Some(&n.id),
            _ => None,
        })
    }

    // ----- mutations -----

    /// Insert a node
    ///
    /// # Errors
    /// - `DuplicateNode` if the id is taken
    /// - `Group(..)` if a group payload lists an invalid member, or one that
    ///   already belongs to another group
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if let NodeData::Group(group) = &node.data {
            for member in &group.members {
                self.check_member(&node.id, member)?;
                if let Some(owner) = self.groups_containing(member).next() {
                    return Err(GroupError::AlreadyGrouped {
                        member: member.clone(),
                        group: owner.clone(),
                    }
                    .into());
                }
            }
        }
        tracing::debug!(node = %node.id, kind = %node.kind(), "node added");
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node together with every incident stream and its group memberships
    ///
    /// The removal is a single step: no dangling stream is ever observable.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .shift_remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        let before = self.edges.len();
        self.edges.retain(|_, e| !e.touches(id));
        let dropped = before - self.edges.len();

        for other in self.nodes.values_mut() {
            if let NodeData::Group(g) = &mut other.data {
                g.members.remove(id);
            }
        }

        tracing::debug!(node = %id, streams_removed = dropped, "node removed");
        Ok(node)
    }

    /// Apply a partial update
    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<&Node, GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        // Check before touching anything so a rejected patch is a no-op.
        if patch.metrics.is_some() && node.data.metrics().is_none() {
            return Err(GraphError::PatchNotApplicable {
                field: "metrics",
                kind: node.kind(),
            });
        }

        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(label) = patch.label {
            match &mut node.data {
                NodeData::Product(p) => p.name = label,
                NodeData::Process(p) => p.name = label,
                NodeData::Group(g) => g.label = label,
                NodeData::Annotation(a) => a.text = label,
            }
        }
        if let (Some(metrics), Some(slot)) = (patch.metrics, node.data.metrics_mut()) {
            *slot = metrics;
        }
        if let Some(v) = patch.draggable {
            node.draggable = v;
        }
        if let Some(v) = patch.selectable {
            node.selectable = v;
        }
        if let Some(v) = patch.deletable {
            node.deletable = v;
        }
        Ok(node)
    }

    /// Move a node (drag end)
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        node.position = position;
        Ok(())
    }

    /// Insert a stream whose endpoints already exist
    ///
    /// # Errors
    /// - `InvalidEdge` if `source` or `target` is unknown
    /// - `Connection(SelfLoop)` if both ends are the same node
    /// - `DuplicateEdgeId` if the id is taken
    /// - `Connection(DuplicateEdge)` if a stream of the same kind already
    ///   joins the pair, in either direction
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(GraphError::InvalidEdge {
                missing: edge.source.clone(),
                end: EdgeEnd::Source,
                edge: edge.id,
            });
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(GraphError::InvalidEdge {
                missing: edge.target.clone(),
                end: EdgeEnd::Target,
                edge: edge.id,
            });
        }
        if edge.source == edge.target {
            return Err(crate::error::ConnectionError::SelfLoop.into());
        }
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdgeId(edge.id));
        }
        if let Some(existing) =
            self.find_edge_between(&edge.source, &edge.target, Some(edge.stream.kind))
        {
            return Err(crate::error::ConnectionError::DuplicateEdge {
                existing: existing.id.clone(),
            }
            .into());
        }
        tracing::debug!(edge = %edge.id, source = %edge.source, target = %edge.target, "stream added");
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<Edge, GraphError> {
        self.edges
            .shift_remove(id)
            .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))
    }

    /// Validate a connect gesture and insert the resulting stream
    pub fn connect(
        &mut self,
        draft: &EdgeDraft,
        validator: &ConnectionValidator,
    ) -> Result<EdgeId, GraphError> {
        let edge = validator.validate(draft, self)?;
        let id = edge.id.clone();
        self.add_edge(edge)?;
        Ok(id)
    }

    fn check_member(&self, group: &NodeId, member: &NodeId) -> Result<(), GroupError> {
        if member == group {
            return Err(GroupError::SelfMembership(group.clone()));
        }
        let node = self
            .nodes
            .get(member)
            .ok_or_else(|| GroupError::MemberNotFound(member.clone()))?;
        if node.kind() == NodeKind::Group {
            return Err(GroupError::NestedGroup {
                group: group.clone(),
                member: member.clone(),
            });
        }
        Ok(())
    }

    // ----- persistence -----

    /// Build a store from persisted records, keeping the valid subset
    ///
    /// Offending records are dropped and reported rather than failing the load.
    /// Streams are keyed by unordered pair as the default validator does.
    #[must_use]
    pub fn hydrate(
        node_records: Vec<NodeRecord>,
        edge_records: Vec<EdgeRecord>,
    ) -> (Self, HydrationReport) {
        Self::hydrate_with(node_records, edge_records, ValidatorConfig::default())
    }

    /// [`hydrate`](Self::hydrate) with the duplicate-stream key taken from `config`
    #[must_use]
    pub fn hydrate_with(
        node_records: Vec<NodeRecord>,
        edge_records: Vec<EdgeRecord>,
        config: ValidatorConfig,
    ) -> (Self, HydrationReport) {
        let mut store = Self::new();
        let mut report = HydrationReport::default();

        // Nodes first, groups validated once every node is known.
        for record in node_records {
            let raw_id = record.id.clone();
            match Node::try_from(record) {
                Ok(node) if store.nodes.contains_key(&node.id) => {
                    report.issues.push(GraphIntegrityError::DuplicateNode(node.id));
                }
                Ok(node) => {
                    store.nodes.insert(node.id.clone(), node);
                }
                Err(e) => report.issues.push(GraphIntegrityError::MalformedNode {
                    id: raw_id,
                    reason: e.to_string(),
                }),
            }
        }

        let group_ids: Vec<NodeId> = store
            .nodes_of_kind(NodeKind::Group)
            .map(|n| n.id.clone())
            .collect();
        let mut owner: HashMap<NodeId, NodeId> = HashMap::new();
        for group_id in group_ids {
            let members: Vec<NodeId> = store
                .group(&group_id)
                .map(|g| g.members.iter().cloned().collect())
                .unwrap_or_default();
            let mut rejected = Vec::new();
            for member in members {
                if store.check_member(&group_id, &member).is_err() {
                    rejected.push(GraphIntegrityError::UnknownMember {
                        group: group_id.clone(),
                        member,
                    });
                } else if let Some(first) = owner.get(&member) {
                    rejected.push(GraphIntegrityError::SharedMember {
                        group: group_id.clone(),
                        owner: first.clone(),
                        member,
                    });
                } else {
                    owner.insert(member, group_id.clone());
                }
            }
            if let Ok(group) = store.group_mut(&group_id) {
                for issue in &rejected {
                    if let GraphIntegrityError::UnknownMember { member, .. }
                    | GraphIntegrityError::SharedMember { member, .. } = issue
                    {
                        group.members.remove(member);
                    }
                }
            }
            report.issues.extend(rejected);
        }

        for record in edge_records {
            let raw_id = record.id.clone();
            let edge = match Edge::try_from(record) {
                Ok(edge) => edge,
                Err(e) => {
                    report.issues.push(GraphIntegrityError::MalformedEdge {
                        id: raw_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let kind = config.stream_kind_in_key.then_some(edge.stream.kind);
            if store.find_edge_between(&edge.source, &edge.target, kind).is_some() {
                report.issues.push(GraphIntegrityError::DuplicateEdge(edge.id));
                continue;
            }
            let issue = match store.add_edge(edge) {
                Ok(()) => continue,
                Err(GraphError::InvalidEdge { edge, missing, .. }) => {
                    GraphIntegrityError::DanglingEdge { edge, missing }
                }
                Err(GraphError::DuplicateEdgeId(id)) => GraphIntegrityError::DuplicateEdge(id),
                Err(GraphError::Connection(crate::error::ConnectionError::DuplicateEdge {
                    ..
                })) => GraphIntegrityError::DuplicateEdge(EdgeId(raw_id)),
                Err(_) => GraphIntegrityError::SelfLoopOnLoad(EdgeId(raw_id)),
            };
            report.issues.push(issue);
        }

        for issue in &report.issues {
            tracing::warn!(%issue, "record dropped during hydration");
        }

        report.nodes_loaded = store.node_count();
        report.edges_loaded = store.edge_count();
        (store, report)
    }

    /// Serialize every node and stream to wire records
    pub fn to_records(&self) -> Result<(Vec<NodeRecord>, Vec<EdgeRecord>), serde_json::Error> {
        let nodes = self
            .nodes
            .values()
            .map(NodeRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let edges = self
            .edges
            .values()
            .map(EdgeRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((nodes, edges))
    }

    /// Invariant violations currently present; always empty for a store
    /// mutated only through its public API
    #[must_use]
    pub fn integrity_issues(&self) -> Vec<GraphIntegrityError> {
        let mut issues = Vec::new();
        for edge in self.edges.values() {
            for end in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(end) {
                    issues.push(GraphIntegrityError::DanglingEdge {
                        edge: edge.id.clone(),
                        missing: end.clone(),
                    });
                }
            }
            if edge.source == edge.target {
                issues.push(GraphIntegrityError::SelfLoopOnLoad(edge.id.clone()));
            }
            let earlier = self
                .find_edge_between(&edge.source, &edge.target, Some(edge.stream.kind))
                .filter(|first| first.id != edge.id);
            if earlier.is_some() {
                issues.push(GraphIntegrityError::DuplicateEdge(edge.id.clone()));
            }
        }
        let mut owner: HashMap<&NodeId, &NodeId> = HashMap::new();
        for node in self.nodes.values() {
            if let NodeData::Group(g) = &node.data {
                for member in &g.members {
                    if self.check_member(&node.id, member).is_err() {
                        issues.push(GraphIntegrityError::UnknownMember {
                            group: node.id.clone(),
                            member: member.clone(),
                        });
                    } else if let Some(first) = owner.get(member) {
                        issues.push(GraphIntegrityError::SharedMember {
                            group: node.id.clone(),
                            member: member.clone(),
                            owner: (*first).clone(),
                        });
                    } else {
                        owner.insert(member, &node.id);
                    }
                }
            }
        }
        issues
    }
}

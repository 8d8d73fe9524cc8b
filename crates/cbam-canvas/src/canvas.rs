//! One install's editable graph
//!
//! A [`Canvas`] wraps a [`GraphStore`] with its viewport, metadata, bound
//! remote flow and the last detected chains. Edits arrive as
//! [`CanvasCommand`]s; every successful, state-changing command bumps the
//! revision, and the canvas is dirty while that revision is unsaved.

use crate::gateway::{FlowId, FlowMetadata, FlowSnapshot, InstallId, Viewport};
use cbam_analysis::{LayoutEngine, LayoutError, LayoutOptions};
use cbam_graph::{
    BoundaryKind, ConnectionValidator, DropOnGroup, Edge, EdgeDraft, EdgeId, GraphError,
    GraphStore, GroupAggregator, GroupError, HydrationReport, MembershipChange, Node, NodeId,
    NodePatch, Position, ProcessChain, RolledUpMetrics, ValidatorConfig,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Descriptive canvas data
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasMetadata {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanvasMetadata {
    fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Editor gesture expressed as data
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    AddNode(Node),
    RemoveNode(NodeId),
    UpdateNode { id: NodeId, patch: NodePatch },
    MoveNode { id: NodeId, position: Position },
    Connect(EdgeDraft),
    RemoveEdge(EdgeId),
    CreateGroup {
        members: Vec<NodeId>,
        boundary_kind: BoundaryKind,
        label: String,
    },
    DropOnGroup(DropOnGroup),
    RemoveFromGroup { group_id: NodeId, node_id: NodeId },
    ToggleCollapse(NodeId),
}

/// What a command did
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    NodeAdded(NodeId),
    NodeRemoved(Node),
    NodeUpdated(NodeId),
    NodeMoved(NodeId),
    Connected(EdgeId),
    EdgeRemoved(Edge),
    GroupCreated(NodeId),
    Membership(MembershipChange),
    MemberRemoved(bool),
    CollapseToggled { collapsed: bool },
}

impl CommandOutcome {
    /// Whether the canvas content changed
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(
            self,
            Self::Membership(MembershipChange::AlreadyMember) | Self::MemberRemoved(false)
        )
    }
}

/// Graph, viewport and bookkeeping for one install
#[derive(Debug, Clone)]
pub struct Canvas {
    install: InstallId,
    store: GraphStore,
    viewport: Viewport,
    metadata: CanvasMetadata,
    chains: Vec<ProcessChain>,
    flow_id: Option<FlowId>,
    revision: u64,
    saved_revision: u64,
    validator: ConnectionValidator,
    groups: GroupAggregator,
}

impl Canvas {
    /// Empty, clean canvas not yet bound to a remote flow
    #[must_use]
    pub fn new(install: InstallId, name: impl Into<String>) -> Self {
        Self {
            install,
            store: GraphStore::new(),
            viewport: Viewport::default(),
            metadata: CanvasMetadata::new(name),
            chains: Vec::new(),
            flow_id: None,
            revision: 0,
            saved_revision: 0,
            validator: ConnectionValidator::default(),
            groups: GroupAggregator::new(),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, config: ValidatorConfig) -> Self {
        self.validator = ConnectionValidator::new(config);
        self
    }

    /// Rebuild from a stored flow; the result is clean and bound to `flow_id`
    #[must_use]
    pub fn from_snapshot(
        install: InstallId,
        flow_id: FlowId,
        snapshot: FlowSnapshot,
        validator: ValidatorConfig,
    ) -> (Self, HydrationReport) {
        let (store, report) = GraphStore::hydrate_with(snapshot.nodes, snapshot.edges, validator);
        let now = Utc::now();
        let meta = snapshot.metadata;
        let canvas = Self {
            install,
            store,
            viewport: snapshot.viewport,
            metadata: CanvasMetadata {
                name: meta.name,
                description: meta.description,
                created_at: meta.created_at.unwrap_or(now),
                updated_at: meta.updated_at.unwrap_or(now),
            },
            chains: Vec::new(),
            flow_id: Some(flow_id),
            revision: 0,
            saved_revision: 0,
            validator: ConnectionValidator::new(validator),
            groups: GroupAggregator::new(),
        };
        (canvas, report)
    }

    /// Wire form of the current content
    pub fn to_snapshot(&self) -> Result<FlowSnapshot, serde_json::Error> {
        let (nodes, edges) = self.store.to_records()?;
        Ok(FlowSnapshot {
            metadata: FlowMetadata {
                install_id: Some(self.install),
                name: self.metadata.name.clone(),
                description: self.metadata.description.clone(),
                created_at: Some(self.metadata.created_at),
                updated_at: Some(self.metadata.updated_at),
                node_count: nodes.len(),
                edge_count: edges.len(),
            },
            nodes,
            edges,
            viewport: self.viewport,
        })
    }

    #[inline]
    #[must_use]
    pub fn install(&self) -> InstallId {
        self.install
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &CanvasMetadata {
        &self.metadata
    }

    /// Chains from the last detection run
    #[inline]
    #[must_use]
    pub fn chains(&self) -> &[ProcessChain] {
        &self.chains
    }

    #[inline]
    #[must_use]
    pub fn flow_id(&self) -> Option<&FlowId> {
        self.flow_id.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    #[must_use]
    pub fn saved_revision(&self) -> u64 {
        self.saved_revision
    }

    /// Unsaved edits exist
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.touch();
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.metadata.name = name.into();
        self.touch();
    }

    /// Apply one editor gesture
    ///
    /// A rejected command leaves the canvas exactly as it was.
    pub fn apply(&mut self, command: CanvasCommand) -> Result<CommandOutcome, GraphError> {
        let outcome = match command {
            CanvasCommand::AddNode(node) => {
                let id = node.id.clone();
                self.store.add_node(node)?;
                CommandOutcome::NodeAdded(id)
            }
            CanvasCommand::RemoveNode(id) => CommandOutcome::NodeRemoved(self.store.remove_node(&id)?),
            CanvasCommand::UpdateNode { id, patch } => {
                self.store.update_node(&id, patch)?;
                CommandOutcome::NodeUpdated(id)
            }
            CanvasCommand::MoveNode { id, position } => {
                self.store.move_node(&id, position)?;
                CommandOutcome::NodeMoved(id)
            }
            CanvasCommand::Connect(draft) => {
                CommandOutcome::Connected(self.store.connect(&draft, &self.validator)?)
            }
            CanvasCommand::RemoveEdge(id) => CommandOutcome::EdgeRemoved(self.store.remove_edge(&id)?),
            CanvasCommand::CreateGroup {
                members,
                boundary_kind,
                label,
            } => CommandOutcome::GroupCreated(self.groups.create_group(
                &mut self.store,
                members,
                boundary_kind,
                label,
            )?),
            CanvasCommand::DropOnGroup(drop) => {
                CommandOutcome::Membership(self.groups.handle_drop(&mut self.store, &drop)?)
            }
            CanvasCommand::RemoveFromGroup { group_id, node_id } => CommandOutcome::MemberRemoved(
                self.groups.remove_member(&mut self.store, &group_id, &node_id)?,
            ),
            CanvasCommand::ToggleCollapse(group_id) => CommandOutcome::CollapseToggled {
                collapsed: self.groups.toggle_collapse(&mut self.store, &group_id)?,
            },
        };
        if outcome.changed() {
            self.touch();
        }
        tracing::debug!(install = %self.install, revision = self.revision, ?outcome, "command applied");
        Ok(outcome)
    }

    /// Reposition visible nodes with the layered layout, as a single revision
    ///
    /// Returns the number of nodes moved.
    pub fn auto_layout(&mut self, options: &LayoutOptions) -> Result<usize, LayoutError> {
        let hidden = self.hidden_nodes();
        let result = LayoutEngine::new(*options).layout_store(&self.store, &hidden)?;
        let mut moved = 0;
        for (id, position) in &result.positions {
            if self.store.move_node(id, *position).is_ok() {
                moved += 1;
            }
        }
        if moved > 0 {
            self.touch();
        }
        tracing::info!(install = %self.install, moved, layers = result.layer_count, "auto-layout applied");
        Ok(moved)
    }

    /// Members of collapsed groups
    #[must_use]
    pub fn hidden_nodes(&self) -> BTreeSet<NodeId> {
        self.groups.hidden_nodes(&self.store)
    }

    pub fn roll_up(&self, group_id: &NodeId) -> Result<RolledUpMetrics, GroupError> {
        self.groups.roll_up(&self.store, group_id)
    }

    pub(crate) fn bind_flow(&mut self, flow_id: FlowId) {
        self.flow_id = Some(flow_id);
    }

    /// Record that `revision` reached the server
    pub(crate) fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = self.saved_revision.max(revision);
    }

    pub(crate) fn replace_chains(&mut self, chains: Vec<ProcessChain>) {
        self.chains = chains;
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.metadata.updated_at = Utc::now();
    }
}

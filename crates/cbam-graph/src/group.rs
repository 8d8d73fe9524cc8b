//! Group aggregation
//!
//! Groups are composite nodes that reference member nodes by id. They are
//! flat (no group inside a group), and a node belongs to at most one group:
//! joining a group leaves any previous one in the same step.
//!
//! Every edit validates first and mutates second, so a rejected edit leaves
//! the store untouched.

use crate::error::{GraphError, GroupError};
use crate::store::GraphStore;
use crate::types::{BoundaryKind, Node, NodeData, NodeId, Position, ProcessChain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Padding between a new group's origin and its top-left member
const GROUP_PADDING: f64 = 40.0;

/// Drop gesture: `dragged_id` was released over `group_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropOnGroup {
    pub dragged_id: NodeId,
    pub group_id: NodeId,
}

/// Result of a membership edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// Membership changed; carries the group's new member count
    Joined { member_count: usize },
    /// The node was already a member; nothing changed
    AlreadyMember,
}

/// CBAM metrics summed over a group's members
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolledUpMetrics {
    pub carbon_intensity: f64,
    pub material_flow: f64,
    pub energy_consumption: f64,
    /// Members that contributed (products and processes)
    pub contributing_members: usize,
}

/// Manages composite group nodes inside a [`GraphStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupAggregator;

impl GroupAggregator {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Create a group over `member_ids`
    ///
    /// Members leave any group they previously belonged to. The group is
    /// placed just above and left of its top-left member.
    ///
    /// # Errors
    /// `Group(..)` if a member is missing or is itself a group
    pub fn create_group(
        &self,
        store: &mut GraphStore,
        member_ids: impl IntoIterator<Item = NodeId>,
        boundary_kind: BoundaryKind,
        label: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        let members: BTreeSet<NodeId> = member_ids.into_iter().collect();
        let id = NodeId::generate();

        let mut origin: Option<Position> = None;
        for member in &members {
            let node = store
                .node(member)
                .ok_or_else(|| GroupError::MemberNotFound(member.clone()))?;
            if matches!(node.data, NodeData::Group(_)) {
                return Err(GroupError::NestedGroup {
                    group: id,
                    member: member.clone(),
                }
                .into());
            }
            let p = node.position;
            origin = Some(origin.map_or(p, |o| Position::new(o.x.min(p.x), o.y.min(p.y))));
        }

        for member in &members {
            self.detach_from_all(store, member);
        }

        let origin = origin.unwrap_or_default();
        let node = Node::group(id.clone(), label, members, boundary_kind)
            .at(origin.x - GROUP_PADDING, origin.y - GROUP_PADDING);
        store.add_node(node)?;
        tracing::debug!(group = %id, "group created");
        Ok(id)
    }

    /// Add `node_id` to `group_id`; idempotent
    pub fn add_member(
        &self,
        store: &mut GraphStore,
        group_id: &NodeId,
        node_id: &NodeId,
    ) -> Result<MembershipChange, GroupError> {
        if node_id == group_id {
            return Err(GroupError::SelfMembership(group_id.clone()));
        }
        if store.group(group_id)?.members.contains(node_id) {
            return Ok(MembershipChange::AlreadyMember);
        }
        let node = store
            .node(node_id)
            .ok_or_else(|| GroupError::MemberNotFound(node_id.clone()))?;
        if matches!(node.data, NodeData::Group(_)) {
            return Err(GroupError::NestedGroup {
                group: group_id.clone(),
                member: node_id.clone(),
            });
        }

        self.detach_from_all(store, node_id);
        let group = store.group_mut(group_id)?;
        group.members.insert(node_id.clone());
        let member_count = group.member_count();
        tracing::debug!(group = %group_id, node = %node_id, member_count, "member added");
        Ok(MembershipChange::Joined { member_count })
    }

    /// Remove `node_id` from `group_id`; returns whether it was a member
    pub fn remove_member(
        &self,
        store: &mut GraphStore,
        group_id: &NodeId,
        node_id: &NodeId,
    ) -> Result<bool, GroupError> {
        Ok(store.group_mut(group_id)?.members.remove(node_id))
    }

    /// Flip the collapsed flag; returns the new state
    pub fn toggle_collapse(
        &self,
        store: &mut GraphStore,
        group_id: &NodeId,
    ) -> Result<bool, GroupError> {
        let group = store.group_mut(group_id)?;
        group.collapsed = !group.collapsed;
        Ok(group.collapsed)
    }

    /// Apply a drop gesture: the dragged node fully joins or nothing changes
    pub fn handle_drop(
        &self,
        store: &mut GraphStore,
        command: &DropOnGroup,
    ) -> Result<MembershipChange, GroupError> {
        self.add_member(store, &command.group_id, &command.dragged_id)
    }

    /// Sum CBAM metrics over the group's current members
    ///
    /// Missing fields count as zero; members without metrics are skipped.
    pub fn roll_up(&self, store: &GraphStore, group_id: &NodeId) -> Result<RolledUpMetrics, GroupError> {
        let group = store.group(group_id)?;
        let mut out = RolledUpMetrics::default();
        for metrics in group
            .members
            .iter()
            .filter_map(|m| store.node(m))
            .filter_map(|n| n.data.metrics())
        {
            out.carbon_intensity += metrics.carbon_intensity.unwrap_or(0.0);
            out.material_flow += metrics.material_flow.unwrap_or(0.0);
            out.energy_consumption += metrics.energy_consumption.unwrap_or(0.0);
            out.contributing_members += 1;
        }
        Ok(out)
    }

    /// Materialise a detected chain as an integrated process group
    pub fn group_chain(
        &self,
        store: &mut GraphStore,
        chain: &ProcessChain,
        boundary_kind: BoundaryKind,
    ) -> Result<NodeId, GraphError> {
        let members: Vec<NodeId> = if chain.process_ids.is_empty() {
            vec![chain.start_process_id.clone(), chain.end_process_id.clone()]
        } else {
            chain.process_ids.clone()
        };
        self.create_group(store, members, boundary_kind, chain.name.clone())
    }

    /// Nodes hidden because their group is collapsed
    #[must_use]
    pub fn hidden_nodes(&self, store: &GraphStore) -> BTreeSet<NodeId> {
        store
            .nodes()
            .filter_map(|n| n.data.as_group())
            .filter(|g| g.collapsed)
            .flat_map(|g| g.members.iter().cloned())
            .collect()
    }

    fn detach_from_all(&self, store: &mut GraphStore, node_id: &NodeId) {
        let owners: Vec<NodeId> = store.groups_containing(node_id).cloned().collect();
        for owner in owners {
            if let Ok(group) = store.group_mut(&owner) {
                group.members.remove(node_id);
            }
        }
    }
}

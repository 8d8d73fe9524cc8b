//! Error types for the process graph
//!
//! - [`ConnectionError`]: a connect gesture was rejected; the graph is untouched
//! - [`GroupError`]: a membership edit was rejected; the graph is untouched
//! - [`GraphError`]: store primitives (add/remove/update) failed
//! - [`GraphIntegrityError`]: a persisted record was dropped during hydration

use crate::types::{EdgeId, NodeId, NodeKind};

/// Which end of a proposed stream an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Source,
    Target,
}

impl std::fmt::Display for EdgeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeEnd::Source => f.write_str("source"),
            EdgeEnd::Target => f.write_str("target"),
        }
    }
}

/// Rejection reasons for a proposed connection, in rule order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Source and target are the same node
    #[error("a stream cannot connect a node to itself")]
    SelfLoop,

    /// A handle id was not supplied
    #[error("missing {0} handle")]
    MissingHandle(EdgeEnd),

    /// A handle id does not match `<nodeId>-(left|right|top|bottom)`
    #[error("malformed {end} handle: {handle:?}")]
    MalformedHandle { end: EdgeEnd, handle: String },

    /// A stream already joins the two nodes
    #[error("nodes are already connected by stream {existing}")]
    DuplicateEdge { existing: EdgeId },
}

/// Group membership errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("group not found: {0}")]
    GroupNotFound(NodeId),

    #[error("node {id} is a {kind}, not a group")]
    NotAGroup { id: NodeId, kind: NodeKind },

    /// A group cannot contain itself
    #[error("group {0} cannot be its own member")]
    SelfMembership(NodeId),

    /// Groups are flat
    #[error("group {member} cannot be nested inside group {group}")]
    NestedGroup { group: NodeId, member: NodeId },

    #[error("member node not found: {0}")]
    MemberNotFound(NodeId),

    /// Membership is exclusive
    #[error("node {member} already belongs to group {group}")]
    AlreadyGrouped { member: NodeId, group: NodeId },
}

/// Store-level errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("duplicate stream id: {0}")]
    DuplicateEdgeId(EdgeId),

    #[error("stream not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Stream references a node that does not exist
    #[error("invalid stream {edge}: {end} node {missing} does not exist")]
    InvalidEdge {
        edge: EdgeId,
        end: EdgeEnd,
        missing: NodeId,
    },

    /// Patch field does not apply to the node's kind
    #[error("cannot set {field} on a {kind} node")]
    PatchNotApplicable { field: &'static str, kind: NodeKind },

    #[error("connection rejected: {0}")]
    Connection(#[from] ConnectionError),

    #[error("group edit rejected: {0}")]
    Group(#[from] GroupError),
}

impl GraphError {
    /// Whether the error is a user gesture being refused, rather than a caller bug
    #[inline]
    #[must_use]
    pub fn is_rejected_gesture(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Group(_))
    }
}

/// Records dropped while hydrating a graph from persisted data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphIntegrityError {
    #[error("duplicate node {0} dropped")]
    DuplicateNode(NodeId),

    #[error("node {id} dropped: {reason}")]
    MalformedNode { id: String, reason: String },

    #[error("stream {id} dropped: {reason}")]
    MalformedEdge { id: String, reason: String },

    /// Stream id already loaded, or its node pair already joined
    #[error("duplicate stream {0} dropped")]
    DuplicateEdge(EdgeId),

    /// Stream endpoint refers to a node that was not loaded
    #[error("dangling stream {edge} dropped: node {missing} does not exist")]
    DanglingEdge { edge: EdgeId, missing: NodeId },

    #[error("self-loop stream {0} dropped")]
    SelfLoopOnLoad(EdgeId),

    /// Group member is missing, a group, or the group itself
    #[error("member {member} removed from group {group}")]
    UnknownMember { group: NodeId, member: NodeId },

    /// Member listed by more than one group; the first group keeps it
    #[error("member {member} removed from group {group}: already in group {owner}")]
    SharedMember {
        group: NodeId,
        member: NodeId,
        owner: NodeId,
    },
}

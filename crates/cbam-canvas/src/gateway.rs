//! Remote flow storage
//!
//! [`PersistenceGateway`] is the seam to the flow-storage service. The canvas
//! manager only ever talks to it through this trait; [`InMemoryGateway`]
//! (see [`crate::memory`]) backs tests and offline use.

use crate::error::PersistenceError;
use cbam_graph::{EdgeRecord, NodeKind, NodeRecord, Position, ProcessChain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Facility owning a canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallId(pub u64);

impl fmt::Display for InstallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstallId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Server-assigned flow identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub String);

impl FlowId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pan and zoom of the editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Descriptive data stored next to a flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowMetadata {
    pub install_id: Option<InstallId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub node_count: usize,
    pub edge_count: usize,
}

/// A flow as exchanged with the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub metadata: FlowMetadata,
    pub viewport: Viewport,
}

/// Node creation request; the server assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: Value,
}

impl NodeDraft {
    #[must_use]
    pub fn new(kind: NodeKind, position: Position, data: Value) -> Self {
        Self {
            kind,
            position,
            data,
        }
    }
}

/// Acknowledgement of a stored flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    pub flow_id: FlowId,
    pub updated_at: DateTime<Utc>,
}

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum HealthStatus {
    Ok,
    Degraded { reason: String },
}

impl HealthStatus {
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Remote flow-storage service
///
/// Every call is a single awaited request; implementations must not retry.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create an empty flow owned by `install`
    async fn create_flow(&self, install: InstallId, name: &str) -> Result<FlowId, PersistenceError>;

    /// Replace the stored content of `flow`
    async fn save_flow(
        &self,
        flow: &FlowId,
        snapshot: &FlowSnapshot,
    ) -> Result<SaveAck, PersistenceError>;

    /// Fetch the stored content of `flow`
    async fn load_flow(&self, flow: &FlowId) -> Result<FlowSnapshot, PersistenceError>;

    /// Flow owned by `install`, if one was ever created
    async fn find_flow(&self, install: InstallId) -> Result<Option<FlowId>, PersistenceError>;

    /// Append a node to `flow`, returning it with its assigned id
    async fn create_node(
        &self,
        flow: &FlowId,
        draft: &NodeDraft,
    ) -> Result<NodeRecord, PersistenceError>;

    async fn health_check(&self) -> Result<HealthStatus, PersistenceError>;

    /// Chains last persisted for `install`
    async fn list_chains(&self, install: InstallId) -> Result<Vec<ProcessChain>, PersistenceError>;

    /// Run chain detection server-side and persist the result
    async fn detect_chains(&self, install: InstallId)
        -> Result<Vec<ProcessChain>, PersistenceError>;

    /// Replace the persisted chains of `install`
    async fn save_chains(
        &self,
        install: InstallId,
        chains: &[ProcessChain],
    ) -> Result<(), PersistenceError>;
}

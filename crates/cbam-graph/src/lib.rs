//! CBAM Graph - process-flow model
//!
//! The in-memory representation of a factory's manufacturing flow:
//! - Products, processes, groups and annotations as typed nodes
//! - Material, energy, carbon and waste streams as edges
//! - Connection rules for the editor's connect gesture
//! - Composite group nodes with CBAM metric roll-up
//!
//! # Example
//!
//! ```rust,ignore
//! use cbam_graph::prelude::*;
//!
//! let mut store = GraphStore::new();
//! store.add_node(Node::process("sinter", "Sintering"))?;
//! store.add_node(Node::process("blast", "Blast furnace"))?;
//!
//! let validator = ConnectionValidator::default();
//! let draft = EdgeDraft::new("sinter", "blast").stream(StreamKind::Material, 10.0, "t");
//! store.connect(&draft, &validator)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod group;
pub mod store;
pub mod types;
pub mod validator;
pub mod wire;

pub use error::{ConnectionError, EdgeEnd, GraphError, GraphIntegrityError, GroupError};
pub use group::{DropOnGroup, GroupAggregator, MembershipChange, RolledUpMetrics};
pub use store::{GraphStore, HydrationReport};
pub use types::{
    AnnotationData, BoundaryKind, CbamMetrics, ChainId, Edge, EdgeDraft, EdgeId, GroupData,
    Handle, Node, NodeData, NodeId, NodeKind, NodePatch, Position, ProcessChain, ProcessData,
    ProductData, Side, StreamData, StreamKind,
};
pub use validator::{ConnectionValidator, ValidatorConfig};
pub use wire::{EdgeRecord, EdgeRecordError, NodeRecord, NodeRecordError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the process graph
    pub use crate::{
        BoundaryKind, CbamMetrics, ConnectionValidator, DropOnGroup, Edge, EdgeDraft, GraphStore,
        GroupAggregator, Node, NodeId, NodeKind, Position, StreamKind,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

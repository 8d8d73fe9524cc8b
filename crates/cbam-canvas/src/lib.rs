//! CBAM Canvas - per-install canvas state
//!
//! Keeps every facility's process-flow canvas in memory for the session and
//! synchronises it with remote flow storage:
//! - [`Canvas`]: graph, viewport, revision tracking and editor commands
//! - [`CanvasStateManager`]: install-keyed cache, ordered save/load, autosave
//! - [`PersistenceGateway`]: the storage service seam
//! - [`FlowConfig`]: TOML configuration for the whole workspace
//!
//! # Example
//!
//! ```rust,ignore
//! use cbam_canvas::prelude::*;
//! use std::sync::Arc;
//!
//! let manager = CanvasStateManager::new(Arc::new(InMemoryGateway::new()));
//! let install = InstallId(7);
//! manager.activate(install);
//! manager.apply(install, CanvasCommand::AddNode(Node::process("kiln", "Kiln")))?;
//! manager.save(install).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod canvas;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod memory;

pub use canvas::{Canvas, CanvasCommand, CanvasMetadata, CommandOutcome};
pub use config::{CanvasConfig, FlowConfig};
pub use error::{CanvasError, ConfigError, PersistenceError};
pub use gateway::{
    FlowId, FlowMetadata, FlowSnapshot, HealthStatus, InstallId, NodeDraft, PersistenceGateway,
    SaveAck, Viewport,
};
pub use manager::{CanvasStateManager, DetectionMode, LoadOutcome, SaveOutcome};
pub use memory::InMemoryGateway;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        Canvas, CanvasCommand, CanvasStateManager, DetectionMode, FlowConfig, InMemoryGateway,
        InstallId, PersistenceGateway,
    };
    pub use cbam_graph::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

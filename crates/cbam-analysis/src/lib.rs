//! CBAM Analysis - derived views over the process graph
//!
//! Read-only computations on a [`GraphStore`](cbam_graph::GraphStore):
//! - Process chain detection with emission totals
//! - Layered auto-layout
//!
//! Neither engine mutates the store; callers decide what to do with the
//! result.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod chain;
pub mod layout;

pub use chain::{ChainDetectionEngine, DetectionAmbiguous, DetectionConfig, DetectionReport};
pub use layout::{LayoutDirection, LayoutEngine, LayoutError, LayoutOptions, LayoutResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{ChainDetectionEngine, DetectionConfig, LayoutEngine, LayoutOptions};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

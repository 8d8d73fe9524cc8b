//! Commands behind the `cbam-flow` binary
//!
//! Each command reads an exported flow (`{nodes, edges, metadata?, viewport?}`)
//! and returns a serialisable report; the binary prints it.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;

pub use commands::{check, detect, layout, read_flow, rollup, CheckReport, LayoutReport};

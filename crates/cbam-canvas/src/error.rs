//! Error types for canvas state and persistence
//!
//! Persistence failures are never retried here: they are classified and
//! handed back so the user can retry explicitly.

use crate::gateway::InstallId;
use cbam_analysis::LayoutError;
use cbam_graph::GraphError;
use std::path::PathBuf;

/// Failures of the remote flow-storage service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Network failure or service down
    #[error("persistence service unavailable: {0}")]
    Unavailable(String),

    /// Service answered with an error status
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// No flow stored under this id
    #[error("flow not found: {0}")]
    FlowNotFound(String),

    /// Service refused the payload
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),
}

impl PersistenceError {
    /// Whether an explicit retry has a chance of succeeding
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::FlowNotFound(_) | Self::Rejected(_) | Self::Codec(_) => false,
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Canvas manager errors
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("no active canvas")]
    NoActiveCanvas,

    #[error("install {0} has no canvas")]
    UnknownInstall(InstallId),
}

impl CanvasError {
    /// Whether the operation may succeed if the user retries
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(e) if e.is_retryable())
    }

    /// Whether this is an editor gesture the graph refused
    #[inline]
    #[must_use]
    pub fn is_rejected_gesture(&self) -> bool {
        matches!(self, Self::Graph(e) if e.is_rejected_gesture())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

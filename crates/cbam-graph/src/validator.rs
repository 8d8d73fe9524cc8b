//! Connection rules for the connect gesture
//!
//! Rules are applied in order and the first failure wins:
//! 1. source and target differ
//! 2. both handles are present
//! 3. both handles match `<nodeId>-(left|right|top|bottom)` for their own endpoint
//! 4. no stream already joins the unordered pair
//!
//! Validation has no side effects; callers insert the returned [`Edge`].

use crate::error::{ConnectionError, EdgeEnd};
use crate::store::GraphStore;
use crate::types::{Edge, EdgeDraft, EdgeId, Handle, NodeId, DEFAULT_EDGE_TYPE};
use serde::{Deserialize, Serialize};

/// Validator settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Include the stream kind in the duplicate key, allowing e.g. a material
    /// stream and a waste return stream between the same pair
    pub stream_kind_in_key: bool,
}

impl ValidatorConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_stream_kind_in_key(mut self, enabled: bool) -> Self {
        self.stream_kind_in_key = enabled;
        self
    }
}

/// Accepts or rejects proposed connections
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionValidator {
    config: ValidatorConfig,
}

impl ConnectionValidator {
    #[inline]
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> ValidatorConfig {
        self.config
    }

    /// Validate `draft` against `store`
    ///
    /// # Returns
    /// A complete [`Edge`] with a freshly generated id
    ///
    /// # Errors
    /// The first failing rule, as a [`ConnectionError`]
    pub fn validate(&self, draft: &EdgeDraft, store: &GraphStore) -> Result<Edge, ConnectionError> {
        if draft.source == draft.target {
            return Err(ConnectionError::SelfLoop);
        }

        let source_raw = draft
            .source_handle
            .as_deref()
            .ok_or(ConnectionError::MissingHandle(EdgeEnd::Source))?;
        let target_raw = draft
            .target_handle
            .as_deref()
            .ok_or(ConnectionError::MissingHandle(EdgeEnd::Target))?;

        let source_handle = anchored_handle(source_raw, &draft.source, EdgeEnd::Source)?;
        let target_handle = anchored_handle(target_raw, &draft.target, EdgeEnd::Target)?;

        let kind = self.config.stream_kind_in_key.then_some(draft.stream.kind);
        if let Some(existing) = store.find_edge_between(&draft.source, &draft.target, kind) {
            return Err(ConnectionError::DuplicateEdge {
                existing: existing.id.clone(),
            });
        }

        Ok(Edge {
            id: EdgeId::generate(),
            source: draft.source.clone(),
            target: draft.target.clone(),
            source_handle,
            target_handle,
            edge_type: draft
                .edge_type
                .clone()
                .unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string()),
            stream: draft.stream.clone(),
        })
    }
}

fn anchored_handle(raw: &str, endpoint: &NodeId, end: EdgeEnd) -> Result<Handle, ConnectionError> {
    match Handle::parse(raw) {
        Some(handle) if &handle.node == endpoint => Ok(handle),
        _ => Err(ConnectionError::MalformedHandle {
            end,
            handle: raw.to_string(),
        }),
    }
}

//! Workspace configuration
//!
//! Loaded from TOML; every section and field is optional.
//!
//! ```toml
//! [canvas]
//! autosave_debounce_ms = 500
//!
//! [validator]
//! stream_kind_in_key = true
//!
//! [layout]
//! direction = "top-to-bottom"
//! ```

use crate::error::ConfigError;
use cbam_analysis::{DetectionConfig, LayoutOptions};
use cbam_graph::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Canvas manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Quiet period before a scheduled save fires
    pub autosave_debounce_ms: u64,
    /// Name given to the remote flow created on first save
    pub default_canvas_name: String,
}

impl CanvasConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_autosave_debounce(mut self, debounce: Duration) -> Self {
        self.autosave_debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_default_canvas_name(mut self, name: impl Into<String>) -> Self {
        self.default_canvas_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 800,
            default_canvas_name: "Process flow".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub canvas: CanvasConfig,
    pub validator: ValidatorConfig,
    pub detection: DetectionConfig,
    pub layout: LayoutOptions,
}

impl FlowConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasConfig) -> Self {
        self.canvas = canvas;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutOptions) -> Self {
        self.layout = layout;
        self
    }

    /// Parse from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbam_analysis::LayoutDirection;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(FlowConfig::from_toml_str("").unwrap(), FlowConfig::default());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = FlowConfig::from_toml_str(
            r#"
            [canvas]
            autosave_debounce_ms = 250

            [validator]
            stream_kind_in_key = true

            [detection]
            min_chain_length = 3

            [layout]
            direction = "top-to-bottom"
            node_gap = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(config.canvas.autosave_debounce(), Duration::from_millis(250));
        assert_eq!(config.canvas.default_canvas_name, "Process flow");
        assert!(config.validator.stream_kind_in_key);
        assert_eq!(config.detection.min_chain_length, 3);
        assert_eq!(config.layout.direction, LayoutDirection::TopToBottom);
        assert_eq!(config.layout.node_gap, 10.0);
        assert_eq!(config.layout.node_width, LayoutOptions::default().node_width);
    }

    #[test]
    fn bad_value_is_parse_error() {
        let err = FlowConfig::from_toml_str("[canvas]\nautosave_debounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlowConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        std::fs::write(&path, "[canvas]\ndefault_canvas_name = \"Mill\"\n").unwrap();
        let config = FlowConfig::load(&path).unwrap();
        assert_eq!(config.canvas.default_canvas_name, "Mill");
    }
}

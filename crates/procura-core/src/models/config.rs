//! Engine settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration for the procura engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Locations of the configuration documents.
    pub paths: PathsConfig,

    /// Spatial cell matching.
    pub cells: CellConfig,

    /// Multi-document merge.
    pub merge: MergeConfig,
}

/// Configuration document locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Field-mapping document (YAML or JSON).
    pub field_mapping: PathBuf,

    /// Document-pattern document (YAML or JSON).
    pub document_patterns: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            field_mapping: PathBuf::from("config/field_mapping.yaml"),
            document_patterns: PathBuf::from("config/document_patterns.yaml"),
        }
    }
}

/// Spatial cell index tolerances, in PDF points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Horizontal alignment tolerance.
    pub tolerance_x: f32,

    /// Vertical alignment tolerance.
    pub tolerance_y: f32,

    /// Largest gap accepted between a key cell and its value cell.
    pub max_distance: f32,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            tolerance_x: 5.0,
            tolerance_y: 3.0,
            max_distance: 200.0,
        }
    }
}

/// Multi-document merge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Document types, most authoritative first.
    pub priority: Vec<String>,

    /// Fields never reported, whatever was extracted.
    pub excluded_fields: Vec<String>,

    /// Field to document type re-queried when the field is still empty after
    /// the priority pass.
    pub secondary_fallbacks: BTreeMap<String, String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                "procurement_notice".to_string(),
                "control_price_approval".to_string(),
                "bid_evaluation_report".to_string(),
                "winning_notice".to_string(),
                "contract".to_string(),
            ],
            excluded_fields: Vec::new(),
            secondary_fallbacks: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON or YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::Missing {
            path: path.to_path_buf(),
        })?;
        let document = path.display().to_string();

        if is_yaml(path) {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                document,
                reason: e.to_string(),
            })
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                document,
                reason: e.to_string(),
            })
        }
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Resolve the configuration document paths against `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.paths.field_mapping.is_relative() {
            self.paths.field_mapping = base.join(&self.paths.field_mapping);
        }
        if self.paths.document_patterns.is_relative() {
            self.paths.document_patterns = base.join(&self.paths.document_patterns);
        }
        self
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

//! Engine configuration.

use crate::export::ExportOptions;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::snap::{ANGLE_SNAP_INCREMENT, Grid};
use crate::viewport::ZoomLimits;
use kurbo::Vec2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    MissingFile(std::path::PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables for a canvas session. Every field has a default, so a partial
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub grid: Grid,
    pub zoom: ZoomLimits,
    /// Offset applied to duplicated elements, in canvas units.
    pub duplicate_offset: Vec2,
    /// Gap between nodes placed by auto-layout, in canvas units.
    pub layout_spacing: f64,
    /// Rotation gesture snap increment in degrees; 0 disables snapping.
    pub rotation_snap_degrees: f64,
    /// Hit-test tolerance in screen pixels.
    pub hit_tolerance: f64,
    pub export: ExportOptions,
    pub autosave_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            grid: Grid::default(),
            zoom: ZoomLimits::default(),
            duplicate_offset: Vec2::new(20.0, 20.0),
            layout_spacing: 100.0,
            rotation_snap_degrees: ANGLE_SNAP_INCREMENT,
            hit_tolerance: 4.0,
            export: ExportOptions::default(),
            autosave_interval_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"history_capacity": 10, "grid": {"enabled": true}}"#).unwrap();
        assert_eq!(config.history_capacity, 10);
        assert!(config.grid.enabled);
        assert!((config.grid.size - 20.0).abs() < f64::EPSILON);
        assert!((config.zoom.max - 8.0).abs() < f64::EPSILON);
        assert_eq!(config.autosave_interval_secs, 30);
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hit_tolerance": 8.0}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert!((config.hit_tolerance - 8.0).abs() < f64::EPSILON);

        assert!(matches!(
            EngineConfig::load("/nonexistent/easel.json"),
            Err(ConfigError::MissingFile(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}

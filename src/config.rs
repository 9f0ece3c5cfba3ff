// config.rs -- Tracker and frontend parameters.
//
// Every field has a default matching the fixed-budget firmware settings, so
// a JSON file only needs to name what it overrides:
//
//   { "tracker": { "max_iterations": 30 }, "min_live_features": 8 }

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::TrackingError;
use crate::{MAX_PATCHES, PYRAMID_LEVELS};

/// Parameters of the per-level Gauss-Newton solve.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on solver evaluations per feature per pyramid level.
    pub max_iterations: usize,
    /// Iteration stops once the incremental flow norm drops to this value.
    pub convergence_threshold: f32,
    /// Structure tensors with `|det| <= min_determinant` count as singular.
    pub min_determinant: f32,
    /// How many pyramid levels to traverse, counted from level 0.
    pub pyramid_levels: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_iterations: 50,
            convergence_threshold: 0.01,
            min_determinant: 1e-6,
            pyramid_levels: PYRAMID_LEVELS,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.max_iterations == 0 {
            return Err(TrackingError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.convergence_threshold >= 0.0) {
            return Err(TrackingError::InvalidConfig(format!(
                "convergence_threshold must be non-negative, got {}",
                self.convergence_threshold
            )));
        }
        if !(self.min_determinant >= 0.0) {
            return Err(TrackingError::InvalidConfig(format!(
                "min_determinant must be non-negative, got {}",
                self.min_determinant
            )));
        }
        if self.pyramid_levels == 0 || self.pyramid_levels > PYRAMID_LEVELS {
            return Err(TrackingError::InvalidConfig(format!(
                "pyramid_levels must be in 1..={PYRAMID_LEVELS}, got {}",
                self.pyramid_levels
            )));
        }
        Ok(())
    }
}

/// Parameters of the frame-by-frame driver.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Detector output is truncated to this many keypoints.
    pub max_features: usize,
    /// Re-detect when fewer live tracks than this remain.
    pub min_live_features: usize,
    pub tracker: TrackerConfig,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        FrontendConfig {
            max_features: MAX_PATCHES,
            min_live_features: 5,
            tracker: TrackerConfig::default(),
        }
    }
}

impl FrontendConfig {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.max_features == 0 || self.max_features > MAX_PATCHES {
            return Err(TrackingError::InvalidConfig(format!(
                "max_features must be in 1..={MAX_PATCHES}, got {}",
                self.max_features
            )));
        }
        self.tracker.validate()
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, TrackingError> {
        let config: FrontendConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, TrackingError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}

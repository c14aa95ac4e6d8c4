//! Scene configuration
//!
//! Configuration for the scene core: frames in flight, pool pre-allocation
//! and removal-flush policy. Supports TOML config files with validated
//! defaults, following the engine-wide unified config approach.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML source failed to parse
    #[error("Failed to parse scene config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value is out of its accepted range
    #[error("Invalid scene config: {0}")]
    Validation(String),
}

/// Configuration for a scene's pools and update behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Frames-in-flight count used to size per-frame GPU data slices
    pub max_frames_in_flight: usize,

    /// Node slots reserved up front (0 = grow on demand)
    pub initial_node_capacity: u32,

    /// Skeleton-pose slots reserved up front (0 = grow on demand)
    pub initial_pose_capacity: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: crate::gpu::MAX_FRAMES_IN_FLIGHT,
            initial_node_capacity: 0,
            initial_pose_capacity: 0,
        }
    }
}

impl SceneConfig {
    /// Parse a configuration from a TOML string and validate it
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Validation(format!(
                "max_frames_in_flight must be between 1 and 8, got {}",
                self.max_frames_in_flight
            )));
        }
        Ok(())
    }
}

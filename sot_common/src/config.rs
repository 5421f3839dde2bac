//! Supervisor configuration loading.
//!
//! TOML-backed configuration for the supervisor and its cycle runner.
//! Every field has a default so an empty file (or no file) yields a
//! working simulation setup.
//!
//! # TOML Example
//!
//! ```toml
//! cycle_time_us = 1000
//! dof = 12
//! far_future_offset_cycles = 100000
//! action_lead_cycles = 2
//! control_norm_threshold = 1e-2
//! consistency_threshold = 1e-3
//! primary_channel = "posture"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Control cycle period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,

    /// Robot configuration-space dimension.
    #[serde(default = "default_dof")]
    pub dof: usize,

    /// Arming offset applied on main-solver selection [cycles].
    ///
    /// Must be large enough that replay start always happens first.
    #[serde(default = "default_far_future_offset")]
    pub far_future_offset_cycles: i64,

    /// Arming lead for pre/post actions [cycles].
    #[serde(default = "default_action_lead")]
    pub action_lead_cycles: i64,

    /// Control-norm threshold for the built-in done condition.
    #[serde(default = "default_control_norm_threshold")]
    pub control_norm_threshold: f64,

    /// Divergence threshold for the optional consistency check.
    #[serde(default = "default_consistency_threshold")]
    pub consistency_threshold: f64,

    /// Channel whose fill level gates replay start.
    #[serde(default = "default_primary_channel")]
    pub primary_channel: String,
}

fn default_cycle_time_us() -> u64 {
    consts::CYCLE_TIME_US
}
fn default_dof() -> usize {
    6
}
fn default_far_future_offset() -> i64 {
    consts::FAR_FUTURE_OFFSET_CYCLES
}
fn default_action_lead() -> i64 {
    consts::ACTION_LEAD_CYCLES
}
fn default_control_norm_threshold() -> f64 {
    consts::CONTROL_NORM_THRESHOLD
}
fn default_consistency_threshold() -> f64 {
    consts::CONSISTENCY_THRESHOLD
}
fn default_primary_channel() -> String {
    consts::PRIMARY_CHANNEL.to_string()
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: default_cycle_time_us(),
            dof: default_dof(),
            far_future_offset_cycles: default_far_future_offset(),
            action_lead_cycles: default_action_lead(),
            control_norm_threshold: default_control_norm_threshold(),
            consistency_threshold: default_consistency_threshold(),
            primary_channel: default_primary_channel(),
        }
    }
}

impl SupervisorConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    /// - `ConfigError::FileNotFound` if the file does not exist
    /// - `ConfigError::ParseError` if TOML syntax is invalid
    /// - `ConfigError::ValidationError` if semantic validation fails
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `cycle_time_us` is zero
    /// - `dof` is zero or exceeds `MAX_DOF`
    /// - any arming offset or threshold is non-positive
    /// - `primary_channel` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_us must be positive".to_string(),
            ));
        }
        if self.dof == 0 || self.dof > consts::MAX_DOF {
            return Err(ConfigError::ValidationError(format!(
                "dof must be in 1..={}, got {}",
                consts::MAX_DOF,
                self.dof
            )));
        }
        if self.far_future_offset_cycles <= 0 || self.action_lead_cycles <= 0 {
            return Err(ConfigError::ValidationError(
                "arming offsets must be positive".to_string(),
            ));
        }
        if self.far_future_offset_cycles <= self.action_lead_cycles {
            return Err(ConfigError::ValidationError(
                "far_future_offset_cycles must exceed action_lead_cycles".to_string(),
            ));
        }
        if self.control_norm_threshold <= 0.0 || self.consistency_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(
                "thresholds must be positive".to_string(),
            ));
        }
        if self.primary_channel.is_empty() {
            return Err(ConfigError::ValidationError(
                "primary_channel cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Control cycle period in seconds.
    #[inline]
    pub fn time_step_secs(&self) -> f64 {
        self.cycle_time_us as f64 * 1e-6
    }

    /// Convert a duration in seconds to a cycle count, rounding up.
    #[inline]
    pub fn duration_to_cycles(&self, duration_secs: f64) -> i64 {
        (duration_secs / self.time_step_secs()).ceil() as i64
    }
}

//! # SoT Common Library
//!
//! Shared constants, configuration loading, error taxonomy and pose types
//! for the stack-of-tasks supervisor workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide constants and limits
//! - [`config`] - Supervisor configuration loading (TOML)
//! - [`error`] - Supervisor error taxonomy
//! - [`pose`] - Base pose parsing and validation

pub mod config;
pub mod consts;
pub mod error;
pub mod pose;

/// Monotonic device cycle time.
///
/// Integer cycle count as reported by the device every control period.
/// All arming times and replay cursors are expressed in this unit.
pub type CycleTime = i64;

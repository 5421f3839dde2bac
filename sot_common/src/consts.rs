//! System-wide constants for the SoT supervisor workspace.
//!
//! Single source of truth for all numeric limits and defaults.
//! Imported by all crates — no duplication permitted.

use static_assertions::const_assert;

/// Maximum number of switch inputs / condition slots.
///
/// Every registered solver (main, pre-action or post-action) consumes one
/// slot; aliases created via `duplicate_solver` do not.
pub const MAX_SOLVERS: usize = 64;

/// Maximum robot configuration-space dimension.
pub const MAX_DOF: usize = 256;

/// Symbolic name of the built-in "keep current posture" state.
pub const KEEP_POSTURE_STATE: &str = "";

/// Replay cursor sentinel: the input queue is not replaying.
pub const NOT_REPLAYING: i64 = -1;

/// Default system cycle time in microseconds (1 kHz = 1000 µs).
pub const CYCLE_TIME_US: u64 = 1000;

/// Default far-future arming offset [cycles].
///
/// Applied to both condition evaluators when a main solver is selected, so
/// that no done/error condition can fire before replay has been started for
/// the new state.
pub const FAR_FUTURE_OFFSET_CYCLES: i64 = 100_000;

/// Default arming lead for pre/post actions [cycles].
///
/// Enough cycles for the action to visibly start before its done condition
/// becomes live.
pub const ACTION_LEAD_CYCLES: i64 = 2;

/// Default control-norm threshold for the built-in done condition.
pub const CONTROL_NORM_THRESHOLD: f64 = 1e-2;

/// Default command-divergence threshold for the optional consistency check.
pub const CONSISTENCY_THRESHOLD: f64 = 1e-3;

/// Default primary channel used to gate replay start.
pub const PRIMARY_CHANNEL: &str = "posture";

/// Maximum allowed quaternion norm deviation in `set_base_pose` input.
pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-2;

const_assert!(MAX_SOLVERS > 0);
const_assert!(MAX_SOLVERS <= 256);
const_assert!(MAX_DOF >= 6);

//! Supervisor error taxonomy.
//!
//! Errors raised by the supervisory context. None of them ever propagates
//! into the real-time cycle: the cycle always has a valid last-selected
//! command even if the most recent supervisory call failed.
//!
//! Missing pre/post actions are deliberately NOT errors — they are reported
//! as a `false` return and a log line, and the caller decides whether to
//! proceed. Consistency-check divergence is a `tracing::warn` only.

use thiserror::Error;

/// Error type for supervisory operations.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// Malformed caller input (bad pose length, unnormalized quaternion,
    /// negative replay delay). No state has been mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested symbolic state name is not registered.
    /// Configuration error — fatal to the requested transition.
    #[error("unknown state '{0}'")]
    UnknownState(String),

    /// A switch-input or condition-slot index beyond the allocated count.
    /// Programming error — fatal to the requested transition.
    #[error("index {index} out of range ({count} inputs allocated)")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of allocated inputs/slots.
        count: usize,
    },

    /// An evaluator's slot count diverged from the switch input count.
    /// Registration must happen in lock-step; this indicates a bug.
    #[error("evaluator has {slots} slots, expected {expected}")]
    InconsistentState {
        /// Actual slot count in the evaluator.
        slots: usize,
        /// Slot count implied by the switch input table.
        expected: usize,
    },

    /// The fixed solver capacity is exhausted.
    #[error("solver capacity exhausted ({max} slots)")]
    CapacityExceeded {
        /// Maximum number of slots.
        max: usize,
    },

    /// No solver has been selected yet — `make_initial_sot` must run before
    /// the first cycle.
    #[error("no active solver; call make_initial_sot first")]
    NotInitialized,

    /// RT setup system call failed (mlockall, affinity, scheduler).
    #[error("RT setup failed: {0}")]
    RtSetup(String),
}

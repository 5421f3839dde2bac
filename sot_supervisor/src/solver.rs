//! Solver contract and built-in solvers.
//!
//! A solver is any named control policy that can recompute its command
//! vector at the current cycle and exposes a done and an error condition
//! source. The supervisor registers solvers with the output switch and both
//! condition evaluators in lock-step; the trait is the seam between the
//! supervisor core and the numerical task-stack machinery behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sot_common::CycleTime;
use sot_common::pose::BasePose;

use crate::queue::InputQueueSynchronizer;

// ─── Condition sources ──────────────────────────────────────────────

/// A latched boolean sample, written by one context and read by the cycle.
///
/// The control-norm done condition and solver-owned live conditions are all
/// `Signal`s; the cycle reads the latest sample lock-free.
#[derive(Debug, Default)]
pub struct Signal {
    value: AtomicBool,
}

impl Signal {
    /// Create a signal with an initial sample.
    pub fn new(initial: bool) -> Self {
        Self {
            value: AtomicBool::new(initial),
        }
    }

    /// Latch a new sample.
    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Read the latest sample.
    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }
}

/// Where a done/error condition comes from.
#[derive(Debug, Clone)]
pub enum ConditionSource {
    /// Fixed boolean, typically combined with evaluator arming: a constant
    /// `true` done condition fires exactly when the armed time passes.
    Constant(bool),
    /// Live signal; the evaluator reads its latest sample every cycle.
    Live(Arc<Signal>),
}

impl ConditionSource {
    /// Current sample of this source.
    #[inline]
    pub fn sample(&self) -> bool {
        match self {
            Self::Constant(value) => *value,
            Self::Live(signal) => signal.get(),
        }
    }
}

// ─── Solver contract ────────────────────────────────────────────────

/// A named control policy.
///
/// `compute_command` is called once per cycle for the active solver only,
/// from the real-time context — implementations must not block or allocate.
pub trait Solver: Send {
    /// Human-readable identity for diagnostics.
    fn name(&self) -> &str;

    /// Recompute the command vector for the current cycle.
    ///
    /// `position` is the robot's current configuration; `out` has the
    /// configuration-space dimension and holds the previous command on entry.
    fn compute_command(&mut self, position: &[f64], now: CycleTime, out: &mut [f64]);

    /// Source of this solver's done condition.
    fn done_source(&self) -> ConditionSource;

    /// Source of this solver's error condition.
    fn error_source(&self) -> ConditionSource;

    /// Snapshot of the internal task stack, logged on every transition.
    fn display(&self) -> String {
        self.name().to_string()
    }
}

/// Shared, lockable solver handle.
///
/// The cycle locks the active solver once per cycle (uncontended in normal
/// operation); the supervisory context locks only during registration and
/// the optional off-cycle consistency check.
pub type SolverHandle = Arc<Mutex<dyn Solver>>;

// ─── Keep-posture solver ────────────────────────────────────────────

/// Built-in solver that holds the robot at a captured configuration.
///
/// Registered under the empty-string state at initialization so the device
/// always has a well-defined command from process start. Its done condition
/// is the live control-norm signal; its error condition is constant false.
pub struct KeepPostureSolver {
    name: String,
    reference: Vec<f64>,
    done: ConditionSource,
}

impl KeepPostureSolver {
    /// Create a keep-posture solver with a zero reference.
    ///
    /// `done` should be the control-norm signal of the done evaluator.
    pub fn new(dof: usize, done: ConditionSource) -> Self {
        Self {
            name: "sot_keep".to_string(),
            reference: vec![0.0; dof],
            done,
        }
    }

    /// Re-capture the reference from the robot's current configuration.
    pub fn refresh_reference(&mut self, position: &[f64]) {
        for (r, p) in self.reference.iter_mut().zip(position) {
            *r = *p;
        }
    }

    /// Overwrite the base pose (first 6 components of the reference).
    ///
    /// The remaining joints are untouched — the posture task does not
    /// constrain the base, so they can be changed safely while holding.
    pub fn set_base_pose(&mut self, pose: &BasePose) {
        for (r, c) in self.reference.iter_mut().zip(pose.to_xyzrpy()) {
            *r = c;
        }
    }

    /// The held reference configuration.
    pub fn reference(&self) -> &[f64] {
        &self.reference
    }
}

impl Solver for KeepPostureSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute_command(&mut self, _position: &[f64], _now: CycleTime, out: &mut [f64]) {
        for (o, r) in out.iter_mut().zip(&self.reference) {
            *o = *r;
        }
    }

    fn done_source(&self) -> ConditionSource {
        self.done.clone()
    }

    fn error_source(&self) -> ConditionSource {
        ConditionSource::Constant(false)
    }

    fn display(&self) -> String {
        format!("{}: hold {} dof posture", self.name, self.reference.len())
    }
}

// ─── Queued posture solver ──────────────────────────────────────────

/// Solver that replays a buffered reference trajectory from the input queue.
///
/// Each cycle it drains the channel up to the current time and outputs the
/// latest visible sample, holding the last command while no sample is
/// visible (before replay start, or between sparse samples). Done is
/// constant true: evaluator arming defers it until the expected replay
/// duration has elapsed.
pub struct QueuedPostureSolver {
    name: String,
    channel: String,
    queue: Arc<InputQueueSynchronizer>,
    last: Vec<f64>,
    initialized: bool,
}

impl QueuedPostureSolver {
    /// Create a replay solver reading `channel` from `queue`.
    pub fn new(
        name: impl Into<String>,
        channel: impl Into<String>,
        queue: Arc<InputQueueSynchronizer>,
        dof: usize,
    ) -> Self {
        Self {
            name: name.into(),
            channel: channel.into(),
            queue,
            last: vec![0.0; dof],
            initialized: false,
        }
    }
}

impl Solver for QueuedPostureSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute_command(&mut self, position: &[f64], now: CycleTime, out: &mut [f64]) {
        if !self.initialized {
            // Hold the entry configuration until the first sample arrives.
            for (l, p) in self.last.iter_mut().zip(position) {
                *l = *p;
            }
            self.initialized = true;
        }
        if let Some(sample) = self.queue.read_up_to(&self.channel, now) {
            for (l, v) in self.last.iter_mut().zip(&sample.value) {
                *l = *v;
            }
        }
        for (o, l) in out.iter_mut().zip(&self.last) {
            *o = *l;
        }
    }

    fn done_source(&self) -> ConditionSource {
        ConditionSource::Constant(true)
    }

    fn error_source(&self) -> ConditionSource {
        ConditionSource::Constant(false)
    }

    fn display(&self) -> String {
        format!("{}: replay '{}'", self.name, self.channel)
    }
}

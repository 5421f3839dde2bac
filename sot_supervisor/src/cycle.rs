//! Deterministic per-cycle runner and device boundary.
//!
//! One `run_cycle` call per control period: read the device's position and
//! cycle time, recompute the active solver's command through the output
//! switch, hand it to the device, refresh the control-norm signal and
//! evaluate both condition evaluators. No allocation; the only locks taken
//! are the normally uncontended read paths of the switch and evaluators.
//!
//! Supervisory failures never reach this context — the cycle always has a
//! valid last-selected command.
//!
//! ## RT Setup Sequence
//! 1. Pre-allocate all runtime state (zero heap in loop).
//! 2. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 3. Prefault stack pages.
//! 4. `sched_setaffinity` — pin to isolated CPU core.
//! 5. `sched_setscheduler(SCHED_FIFO)` — RT priority.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use sot_common::CycleTime;
use sot_common::error::SupervisorError;

use crate::events::ConditionEvaluator;
use crate::supervisor::Supervisor;
use crate::switch::OutputSwitch;

// ─── Device boundary ────────────────────────────────────────────────

/// The device executing the chosen command on hardware or simulation.
///
/// Consumed once per cycle: current position/state vector, current cycle
/// time (monotonic cycle count), and the command to apply.
pub trait Device {
    /// Current configuration-space position.
    fn position(&self) -> &[f64];

    /// Current cycle time.
    fn time(&self) -> CycleTime;

    /// Apply the command for this cycle.
    fn apply(&mut self, command: &[f64]);
}

// ─── Device mirror ──────────────────────────────────────────────────

/// Last-cycle device snapshot shared with the supervisory context.
///
/// The cycle publishes time and position here every period; the supervisory
/// context reads them for arming computations, keep-posture refresh and the
/// off-cycle consistency check, without touching the device itself.
pub struct DeviceMirror {
    time: AtomicI64,
    position: RwLock<Vec<f64>>,
}

impl DeviceMirror {
    /// Create a mirror with time 0 and a zero position of dimension `dof`.
    pub fn new(dof: usize) -> Self {
        Self {
            time: AtomicI64::new(0),
            position: RwLock::new(vec![0.0; dof]),
        }
    }

    /// Publish the current cycle's snapshot.
    pub fn update(&self, now: CycleTime, position: &[f64]) {
        {
            let mut stored = self
                .position
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (s, p) in stored.iter_mut().zip(position) {
                *s = *p;
            }
        }
        self.time.store(now, Ordering::Release);
    }

    /// Last published cycle time.
    #[inline]
    pub fn now(&self) -> CycleTime {
        self.time.load(Ordering::Acquire)
    }

    /// Last published position (cloned).
    pub fn position(&self) -> Vec<f64> {
        self.position
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ─── Cycle statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
///
/// Updated every cycle with no allocation. Provides min/max/avg for cycle
/// latency monitoring and overrun detection.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, budget_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Cycle runner ───────────────────────────────────────────────────

/// Result of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Cycle time this outcome refers to.
    pub time: CycleTime,
    /// Evaluated done condition of the active solver.
    pub done: bool,
    /// Evaluated error condition of the active solver.
    pub error: bool,
}

/// Executes the per-cycle read → compute → apply → evaluate sequence.
///
/// Owns the pre-allocated command buffer; everything else is shared with
/// the supervisor through `Arc`s.
pub struct CycleRunner {
    switch: Arc<OutputSwitch>,
    done_events: Arc<ConditionEvaluator>,
    error_events: Arc<ConditionEvaluator>,
    mirror: Arc<DeviceMirror>,
    command: Vec<f64>,
    /// Timing statistics, updated by the owner of the loop.
    pub stats: CycleStats,
}

impl CycleRunner {
    /// Create a runner wired to `supervisor`'s switch and evaluators.
    pub fn new(supervisor: &Supervisor) -> Self {
        Self {
            switch: supervisor.switch(),
            done_events: supervisor.done_events(),
            error_events: supervisor.error_events(),
            mirror: supervisor.mirror(),
            command: vec![0.0; supervisor.dof()],
            stats: CycleStats::new(),
        }
    }

    /// Execute one control cycle against `device`.
    ///
    /// # Errors
    /// `NotInitialized` if no solver has been selected yet (the process must
    /// call `make_initial_sot` before starting the loop). No command is
    /// applied in that case.
    pub fn run_cycle(&mut self, device: &mut dyn Device) -> Result<CycleOutcome, SupervisorError> {
        let now = device.time();
        self.mirror.update(now, device.position());

        self.switch
            .write_output(device.position(), now, &mut self.command)?;
        device.apply(&self.command);

        self.done_events.update_control_norm(&self.command);
        let done = self.done_events.evaluate(now);
        let error = self.error_events.evaluate(now);

        Ok(CycleOutcome { time: now, done, error })
    }

    /// The command applied on the last cycle.
    pub fn last_command(&self) -> &[f64] {
        &self.command
    }
}

// ─── RT setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (prevent page faults in RT loop).
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), SupervisorError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| SupervisorError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), SupervisorError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages to prevent page faults during RT execution.
fn prefault_stack() {
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: writing to a live stack buffer; volatile defeats DCE.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), SupervisorError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| SupervisorError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| SupervisorError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), SupervisorError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), SupervisorError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(SupervisorError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), SupervisorError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
///
/// Must be called on the cycle thread before entering the loop.
/// In simulation mode (no `rt` feature), all RT calls are no-ops.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), SupervisorError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

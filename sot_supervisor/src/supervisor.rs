//! Solver registry and transition table.
//!
//! Maps symbolic state names to main solvers, pre-actions and post-actions,
//! and orchestrates the pre → main → post choreography over the output
//! switch and both condition evaluators. All methods here run on the
//! supervisory context; the real-time cycle only ever sees the atomically
//! committed switch selection and arming times.
//!
//! Transition ordering is load-bearing: both evaluators are re-armed far
//! into the future *before* the switch selection is committed, and replay
//! start re-arms them to the actual expected end time. Selecting a solver
//! whose done/error condition is prematurely live would re-trigger a
//! transition on the very next cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use sot_common::CycleTime;
use sot_common::config::SupervisorConfig;
use sot_common::consts::KEEP_POSTURE_STATE;
use sot_common::error::SupervisorError;
use sot_common::pose::BasePose;

use crate::cycle::DeviceMirror;
use crate::events::ConditionEvaluator;
use crate::queue::InputQueueSynchronizer;
use crate::solver::{ConditionSource, KeepPostureSolver, Signal, Solver, SolverHandle};
use crate::switch::OutputSwitch;

/// A solver together with its immutable switch-input index.
#[derive(Clone)]
struct RegisteredSolver {
    handle: SolverHandle,
    index: usize,
}

impl RegisteredSolver {
    fn display(&self) -> String {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .display()
    }
}

/// The supervisory scheduler.
///
/// Owns the switch, both evaluators, the registry tables and the device
/// mirror. Constructed once at startup; solvers are registered by an
/// external factory before operation begins.
pub struct Supervisor {
    config: SupervisorConfig,
    switch: Arc<OutputSwitch>,
    done_events: Arc<ConditionEvaluator>,
    error_events: Arc<ConditionEvaluator>,
    mirror: Arc<DeviceMirror>,
    queue: Arc<InputQueueSynchronizer>,
    control_norm_signal: Arc<Signal>,

    /// Main solver per symbolic state name.
    solvers: HashMap<String, RegisteredSolver>,
    /// At most one pre-action per state name.
    pre_actions: HashMap<String, RegisteredSolver>,
    /// Post-actions keyed by current state, then by destination state.
    post_actions: HashMap<String, HashMap<String, RegisteredSolver>>,

    /// Symbolic name of the active main solver; unset before initialization.
    current_state: Option<String>,
    keep_posture: Option<Arc<Mutex<KeepPostureSolver>>>,
}

impl Supervisor {
    /// Create a supervisor with empty tables.
    pub fn new(config: SupervisorConfig, queue: Arc<InputQueueSynchronizer>) -> Self {
        let mut done_events = ConditionEvaluator::new("done");
        let control_norm_signal = done_events.setup_control_norm(config.control_norm_threshold);
        let mirror = Arc::new(DeviceMirror::new(config.dof));

        Self {
            config,
            switch: Arc::new(OutputSwitch::new()),
            done_events: Arc::new(done_events),
            error_events: Arc::new(ConditionEvaluator::new("error")),
            mirror,
            queue,
            control_norm_signal,
            solvers: HashMap::new(),
            pre_actions: HashMap::new(),
            post_actions: HashMap::new(),
            current_state: None,
            keep_posture: None,
        }
    }

    // ── Shared-component accessors (for the cycle runner and tests) ──

    /// The output switch.
    pub fn switch(&self) -> Arc<OutputSwitch> {
        self.switch.clone()
    }

    /// The done-condition evaluator.
    pub fn done_events(&self) -> Arc<ConditionEvaluator> {
        self.done_events.clone()
    }

    /// The error-condition evaluator.
    pub fn error_events(&self) -> Arc<ConditionEvaluator> {
        self.error_events.clone()
    }

    /// The device mirror the cycle publishes into.
    pub fn mirror(&self) -> Arc<DeviceMirror> {
        self.mirror.clone()
    }

    /// The input queue.
    pub fn queue(&self) -> Arc<InputQueueSynchronizer> {
        self.queue.clone()
    }

    /// Robot configuration-space dimension.
    pub fn dof(&self) -> usize {
        self.config.dof
    }

    /// The control-norm done signal (constant-true once the command norm
    /// falls below the configured threshold).
    pub fn control_norm_signal(&self) -> Arc<Signal> {
        self.control_norm_signal.clone()
    }

    /// Symbolic name of the active main solver, if initialized.
    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    /// Switch-input index of a registered main solver.
    pub fn main_solver_index(&self, name: &str) -> Option<usize> {
        self.solvers.get(name).map(|reg| reg.index)
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register `solver` with the switch and both evaluators in lock-step.
    fn register(&mut self, solver: SolverHandle) -> Result<RegisteredSolver, SupervisorError> {
        let (done, error) = {
            let guard = solver.lock().unwrap_or_else(PoisonError::into_inner);
            (guard.done_source(), guard.error_source())
        };
        let index = self.switch.add_input(solver.clone())?;
        self.done_events.register(index, done)?;
        self.error_events.register(index, error)?;
        Ok(RegisteredSolver {
            handle: solver,
            index,
        })
    }

    /// Register the main solver for `state`.
    pub fn add_main_solver(
        &mut self,
        state: &str,
        solver: SolverHandle,
    ) -> Result<(), SupervisorError> {
        let registered = self.register(solver)?;
        self.solvers.insert(state.to_string(), registered);
        Ok(())
    }

    /// Register the pre-action for `state` (at most one per state).
    pub fn add_pre_action(
        &mut self,
        state: &str,
        solver: SolverHandle,
    ) -> Result<(), SupervisorError> {
        let registered = self.register(solver)?;
        self.pre_actions.insert(state.to_string(), registered);
        Ok(())
    }

    /// Register a post-action fired on the `from` → `to` edge.
    pub fn add_post_action(
        &mut self,
        from: &str,
        to: &str,
        solver: SolverHandle,
    ) -> Result<(), SupervisorError> {
        let registered = self.register(solver)?;
        self.post_actions
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), registered);
        Ok(())
    }

    /// Alias `new_state` to the solver already registered for
    /// `existing_state` — no new switch input, no new condition slots.
    pub fn duplicate_solver(
        &mut self,
        existing_state: &str,
        new_state: &str,
    ) -> Result<(), SupervisorError> {
        let registered = self
            .solvers
            .get(existing_state)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownState(existing_state.to_string()))?;
        self.solvers.insert(new_state.to_string(), registered);
        Ok(())
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Select the main solver for `state`.
    ///
    /// Re-arms both evaluators far into the future before committing the
    /// switch selection, so no done/error condition can fire before replay
    /// has been started for the new state.
    ///
    /// `consistency_check` compares the candidate and current commands
    /// off-cycle and logs a warning on divergence; it never blocks the
    /// transition and must not run on the real-time context.
    ///
    /// # Errors
    /// `UnknownState` if `state` is not registered; the previous selection
    /// stays active.
    pub fn select_state(
        &mut self,
        state: &str,
        consistency_check: bool,
    ) -> Result<(), SupervisorError> {
        let registered = self
            .solvers
            .get(state)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownState(state.to_string()))?;

        if consistency_check && !self.is_consistent_with_current(state, &registered) {
            warn!(
                current = self.current_state.as_deref().unwrap_or("<none>"),
                candidate = state,
                "candidate solver command diverges from current solver"
            );
        }

        if state == KEEP_POSTURE_STATE
            && let Some(keep) = &self.keep_posture
        {
            keep.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .refresh_reference(&self.mirror.position());
        }

        // No done/error event may trigger before replay starts for the new
        // state; replay re-arms to the actual end time.
        let now = self.mirror.now();
        self.arm_both(now + self.config.far_future_offset_cycles);

        self.commit_selection(&registered)?;
        info!(
            cycle = now,
            state,
            solver = %registered.display(),
            "selected main solver"
        );
        self.current_state = Some(state.to_string());
        Ok(())
    }

    /// Run the pre-action registered for `state`, if any.
    ///
    /// Arms both evaluators a short lead ahead so the action can visibly
    /// start before its done condition becomes live. Returns `false` (after
    /// logging) when no pre-action exists; the active state is unchanged
    /// either way.
    pub fn run_pre_action(&mut self, state: &str) -> Result<bool, SupervisorError> {
        let Some(registered) = self.pre_actions.get(state).cloned() else {
            info!(state, "no pre action");
            return Ok(false);
        };

        let now = self.mirror.now();
        self.arm_both(now + self.config.action_lead_cycles);
        self.commit_selection(&registered)?;
        info!(
            cycle = now,
            state,
            solver = %registered.display(),
            "running pre action"
        );
        Ok(true)
    }

    /// Run the post-action for the `from` → `to` edge, if any.
    ///
    /// Lookup is keyed by the CURRENT active state, not by `from` — by the
    /// time a post-action runs, the main transition has already been
    /// committed and `current_state` is the arrival state. `from` is the
    /// caller's view of the edge and is used for diagnostics only.
    pub fn run_post_action(&mut self, from: &str, to: &str) -> Result<bool, SupervisorError> {
        let registered = self
            .current_state
            .as_ref()
            .and_then(|current| self.post_actions.get(current))
            .and_then(|targets| targets.get(to))
            .cloned();

        let Some(registered) = registered else {
            info!(from, to, "no post action");
            return Ok(false);
        };

        let now = self.mirror.now();
        self.arm_both(now + self.config.action_lead_cycles);
        self.commit_selection(&registered)?;
        info!(
            cycle = now,
            from,
            to,
            solver = %registered.display(),
            "running post action"
        );
        Ok(true)
    }

    /// Commit the switch selection and point both evaluators at it.
    fn commit_selection(&self, registered: &RegisteredSolver) -> Result<(), SupervisorError> {
        self.switch.select(registered.index)?;
        self.done_events.select(registered.index)?;
        self.error_events.select(registered.index)?;
        Ok(())
    }

    fn arm_both(&self, time: CycleTime) {
        self.done_events.arm_at(time);
        self.error_events.arm_at(time);
    }

    /// Compare the candidate solver's instantaneous command against the
    /// current one. Diagnostic only: runs both solvers off the normal
    /// control cycle, so it must never be used on the real-time context.
    fn is_consistent_with_current(&self, state: &str, candidate: &RegisteredSolver) -> bool {
        let Some(current) = &self.current_state else {
            return true;
        };
        if current == state {
            return true;
        }
        let Some(current_reg) = self.solvers.get(current) else {
            return true;
        };

        let now = self.mirror.now();
        let position = self.mirror.position();
        let mut current_cmd = vec![0.0; self.config.dof];
        let mut candidate_cmd = vec![0.0; self.config.dof];
        if self
            .switch
            .compute_at(current_reg.index, &position, now, &mut current_cmd)
            .is_err()
            || self
                .switch
                .compute_at(candidate.index, &position, now, &mut candidate_cmd)
                .is_err()
        {
            return true;
        }

        let error: f64 = current_cmd
            .iter()
            .zip(&candidate_cmd)
            .map(|(c, n)| (c - n) * (c - n))
            .sum::<f64>()
            .sqrt();
        error <= self.config.consistency_threshold
    }

    // ── Initialization ──────────────────────────────────────────────

    /// Build and activate the built-in keep-posture solver.
    ///
    /// Registers it under the empty-string state with the control-norm
    /// signal as its done condition and a constant-false error condition,
    /// then selects it. Guarantees the device has a well-defined command
    /// from process start, before any task-specific solver is selected.
    pub fn make_initial_sot(&mut self) -> Result<(), SupervisorError> {
        let mut solver = KeepPostureSolver::new(
            self.config.dof,
            ConditionSource::Live(self.control_norm_signal.clone()),
        );
        solver.refresh_reference(&self.mirror.position());

        let keep = Arc::new(Mutex::new(solver));
        self.keep_posture = Some(keep.clone());
        let handle: SolverHandle = keep;
        self.add_main_solver(KEEP_POSTURE_STATE, handle)?;
        self.select_state(KEEP_POSTURE_STATE, false)
    }

    /// Set the robot base pose in the world.
    ///
    /// Accepts `[x,y,z,r,p,y]` or `[x,y,z,qx,qy,qz,qw]`. The base is only
    /// free while the keep-posture state is active (the posture task does
    /// not constrain the first 6 DoF); in any other state the call reports
    /// `Ok(false)` without mutating anything.
    ///
    /// # Errors
    /// `Validation` on a malformed pose or unnormalized quaternion — no
    /// state is mutated.
    pub fn set_base_pose(&mut self, pose: &[f64]) -> Result<bool, SupervisorError> {
        let parsed = BasePose::parse(pose)?;

        if self.current_state.as_deref() != Some(KEEP_POSTURE_STATE) {
            return Ok(false);
        }
        let keep = self
            .keep_posture
            .as_ref()
            .ok_or(SupervisorError::NotInitialized)?;
        keep.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_base_pose(&parsed);
        Ok(true)
    }

    // ── Replay control ──────────────────────────────────────────────

    /// Start replaying buffered trajectory data.
    ///
    /// Blocks until the primary channel holds `min_queue_size` samples,
    /// then sets the replay cursor to `now + delay_cycles` and arms both
    /// evaluators at cursor + `duration_secs` worth of cycles — the
    /// mechanism by which "done" is deferred until the expected replay
    /// duration has elapsed.
    ///
    /// Supervisory context only: the minimum-fill wait has unbounded
    /// latency. If `min_queue_size` exceeds the number of samples the
    /// source will ever produce, this call never returns.
    ///
    /// # Errors
    /// `Validation` if `delay_cycles` is negative — nothing is mutated.
    pub fn start_replay(
        &mut self,
        delay_cycles: i64,
        min_queue_size: usize,
        duration_secs: f64,
    ) -> Result<(), SupervisorError> {
        if delay_cycles < 0 {
            return Err(SupervisorError::Validation(format!(
                "replay delay must be >= 0, got {delay_cycles}"
            )));
        }

        self.queue
            .wait_min_fill(&self.config.primary_channel, min_queue_size);

        let start = self.mirror.now() + delay_cycles;
        let duration_cycles = self.config.duration_to_cycles(duration_secs);
        self.queue.start_replay_at(start);
        self.arm_both(start + duration_cycles);
        info!(
            replay_start = start,
            duration_cycles,
            channel = %self.config.primary_channel,
            "replay started"
        );
        Ok(())
    }

    /// Stop replaying: consumers see an empty stream from the next cycle.
    pub fn stop_replay(&self) {
        self.queue.stop_replay();
    }

    /// Stop replaying and discard all buffered samples on every channel.
    pub fn clear_queues(&self) {
        self.log_queue_sizes();
        self.queue.clear();
    }

    /// Log per-channel fill levels.
    pub fn log_queue_sizes(&self) {
        for (channel, size) in self.queue.queue_sizes() {
            info!(channel = %channel, size, "queue fill");
        }
    }
}

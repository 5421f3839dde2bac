//! Glitch-free output switch.
//!
//! Routes exactly one solver's command vector to the device per cycle.
//! Input indices are allocated once, monotonically increasing, and never
//! reused. Selection is a single atomic store: a transition request takes
//! effect either fully before or fully after a given cycle's read, never
//! partially.

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::PoisonError;

use sot_common::CycleTime;
use sot_common::consts::MAX_SOLVERS;
use sot_common::error::SupervisorError;

use crate::solver::SolverHandle;

/// Sentinel: no input selected yet.
const NO_SELECTION: usize = usize::MAX;

/// Single-active-input selector feeding the device.
pub struct OutputSwitch {
    /// Connected solver inputs, indexed by allocation order. Append-only;
    /// appends happen only in the supervisory/setup context.
    inputs: RwLock<heapless::Vec<SolverHandle, MAX_SOLVERS>>,
    /// Index of the active input.
    active: AtomicUsize,
}

impl OutputSwitch {
    /// Create a switch with no inputs and no selection.
    pub fn new() -> Self {
        Self {
            inputs: RwLock::new(heapless::Vec::new()),
            active: AtomicUsize::new(NO_SELECTION),
        }
    }

    /// Connect a solver to the next free input index.
    ///
    /// Returns the allocated index. Indices are never reassigned.
    ///
    /// # Errors
    /// `CapacityExceeded` when all inputs are taken.
    pub fn add_input(&self, solver: SolverHandle) -> Result<usize, SupervisorError> {
        let mut inputs = self.inputs.write().unwrap_or_else(PoisonError::into_inner);
        let index = inputs.len();
        inputs
            .push(solver)
            .map_err(|_| SupervisorError::CapacityExceeded { max: MAX_SOLVERS })?;
        Ok(index)
    }

    /// Number of allocated inputs.
    pub fn input_count(&self) -> usize {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Atomically repoint the active output to `index`.
    ///
    /// The change is observed by the cycle on its next read only.
    ///
    /// # Errors
    /// `IndexOutOfRange` if `index` is beyond the allocated inputs.
    pub fn select(&self, index: usize) -> Result<(), SupervisorError> {
        let count = self.input_count();
        if index >= count {
            return Err(SupervisorError::IndexOutOfRange { index, count });
        }
        self.active.store(index, Ordering::Release);
        Ok(())
    }

    /// The active input index, if any.
    pub fn active(&self) -> Option<usize> {
        match self.active.load(Ordering::Acquire) {
            NO_SELECTION => None,
            index => Some(index),
        }
    }

    /// Recompute the active solver's command into `out`.
    ///
    /// Called once per cycle from the real-time context. The active index is
    /// read exactly once, so a concurrent `select` is seen fully before or
    /// fully after this cycle.
    ///
    /// # Errors
    /// `NotInitialized` before the first selection.
    pub fn write_output(
        &self,
        position: &[f64],
        now: CycleTime,
        out: &mut [f64],
    ) -> Result<(), SupervisorError> {
        let index = self.active.load(Ordering::Acquire);
        if index == NO_SELECTION {
            return Err(SupervisorError::NotInitialized);
        }
        self.compute_at(index, position, now, out)
    }

    /// Recompute input `index`'s command into `out`.
    ///
    /// Used by `write_output` and by the off-cycle consistency check.
    pub fn compute_at(
        &self,
        index: usize,
        position: &[f64],
        now: CycleTime,
        out: &mut [f64],
    ) -> Result<(), SupervisorError> {
        let handle = {
            let inputs = self.inputs.read().unwrap_or_else(PoisonError::into_inner);
            inputs
                .get(index)
                .cloned()
                .ok_or(SupervisorError::IndexOutOfRange {
                    index,
                    count: inputs.len(),
                })?
        };
        handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .compute_command(position, now, out);
        Ok(())
    }
}

impl Default for OutputSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{ConditionSource, Solver};
    use std::sync::{Arc, Mutex};

    struct ConstantSolver {
        name: String,
        command: Vec<f64>,
    }

    impl Solver for ConstantSolver {
        fn name(&self) -> &str {
            &self.name
        }
        fn compute_command(&mut self, _position: &[f64], _now: CycleTime, out: &mut [f64]) {
            out.copy_from_slice(&self.command);
        }
        fn done_source(&self) -> ConditionSource {
            ConditionSource::Constant(false)
        }
        fn error_source(&self) -> ConditionSource {
            ConditionSource::Constant(false)
        }
    }

    fn constant(name: &str, command: Vec<f64>) -> SolverHandle {
        Arc::new(Mutex::new(ConstantSolver {
            name: name.to_string(),
            command,
        }))
    }

    #[test]
    fn indices_are_monotonic_and_unique() {
        let switch = OutputSwitch::new();
        for i in 0..5 {
            let index = switch.add_input(constant("s", vec![0.0])).unwrap();
            assert_eq!(index, i);
        }
        assert_eq!(switch.input_count(), 5);
    }

    #[test]
    fn unselected_switch_reports_not_initialized() {
        let switch = OutputSwitch::new();
        switch.add_input(constant("s", vec![1.0])).unwrap();

        let mut out = [0.0];
        assert!(matches!(
            switch.write_output(&[0.0], 0, &mut out),
            Err(SupervisorError::NotInitialized)
        ));
        assert_eq!(switch.active(), None);
    }

    #[test]
    fn select_routes_exactly_one_input() {
        let switch = OutputSwitch::new();
        switch.add_input(constant("a", vec![1.0, 1.0])).unwrap();
        switch.add_input(constant("b", vec![2.0, 2.0])).unwrap();

        let mut out = [0.0; 2];
        switch.select(0).unwrap();
        switch.write_output(&[0.0, 0.0], 0, &mut out).unwrap();
        assert_eq!(out, [1.0, 1.0]);

        switch.select(1).unwrap();
        switch.write_output(&[0.0, 0.0], 1, &mut out).unwrap();
        assert_eq!(out, [2.0, 2.0]);
        assert_eq!(switch.active(), Some(1));
    }

    #[test]
    fn select_out_of_range_is_fatal_to_the_call() {
        let switch = OutputSwitch::new();
        switch.add_input(constant("a", vec![1.0])).unwrap();
        switch.select(0).unwrap();

        assert!(matches!(
            switch.select(3),
            Err(SupervisorError::IndexOutOfRange { index: 3, count: 1 })
        ));
        // Failed select leaves the previous selection intact.
        assert_eq!(switch.active(), Some(0));
    }

    #[test]
    fn compute_at_reaches_inactive_inputs() {
        let switch = OutputSwitch::new();
        switch.add_input(constant("a", vec![1.0])).unwrap();
        switch.add_input(constant("b", vec![2.0])).unwrap();
        switch.select(0).unwrap();

        let mut out = [0.0];
        switch.compute_at(1, &[0.0], 0, &mut out).unwrap();
        assert_eq!(out, [2.0]);
    }
}

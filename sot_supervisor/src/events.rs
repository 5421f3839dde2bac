//! Per-cycle condition evaluation with deferred arming.
//!
//! Two [`ConditionEvaluator`] instances exist, one for "done" and one for
//! "error". Each holds an append-only set of per-solver condition sources,
//! an observed slot index and a future arming time. Immediately after a
//! switch the newly active solver's condition is often transiently wrong
//! from the previous context; arming forces the evaluator false until a
//! caller-chosen cycle time, suppressing spurious transitions.
//!
//! Slot registration happens only in the supervisory/setup context, in
//! lock-step with switch-input allocation. The real-time cycle reads the
//! observed index and armed time through atomics and takes an uncontended
//! read lock on the slot array.

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};

use sot_common::CycleTime;
use sot_common::consts::MAX_SOLVERS;
use sot_common::error::SupervisorError;

use crate::solver::{ConditionSource, Signal};

/// Sentinel: no slot selected yet.
const UNSELECTED: usize = usize::MAX;

/// Per-cycle boolean aggregator over a set of condition sources.
pub struct ConditionEvaluator {
    /// Diagnostic name ("done" / "error").
    name: &'static str,
    /// Append-only condition slots, indexed by switch-input index.
    slots: RwLock<heapless::Vec<ConditionSource, MAX_SOLVERS>>,
    /// Currently observed slot.
    observed: AtomicUsize,
    /// Cycle time before which the evaluator is forced false.
    armed_at: AtomicI64,
    /// Control-norm condition, if configured.
    control_norm: Option<ControlNorm>,
}

struct ControlNorm {
    signal: Arc<Signal>,
    threshold: f64,
}

impl ConditionEvaluator {
    /// Create an evaluator with no slots, unselected and unarmed.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RwLock::new(heapless::Vec::new()),
            observed: AtomicUsize::new(UNSELECTED),
            armed_at: AtomicI64::new(0),
            control_norm: None,
        }
    }

    /// Configure the control-norm condition signal.
    ///
    /// Returns the signal so it can be plugged as a solver's done source.
    /// The cycle runner latches `‖command‖ < threshold` into it every cycle.
    pub fn setup_control_norm(&mut self, threshold: f64) -> Arc<Signal> {
        let signal = Arc::new(Signal::new(false));
        self.control_norm = Some(ControlNorm {
            signal: signal.clone(),
            threshold,
        });
        signal
    }

    /// Update the control-norm signal from the current command vector.
    ///
    /// No-op if `setup_control_norm` was never called.
    #[inline]
    pub fn update_control_norm(&self, command: &[f64]) {
        if let Some(norm) = &self.control_norm {
            let sq: f64 = command.iter().map(|c| c * c).sum();
            norm.signal.set(sq.sqrt() < norm.threshold);
        }
    }

    /// Append a condition slot for a newly registered solver.
    ///
    /// `expected_index` is the switch-input index allocated for the same
    /// solver; registration must happen in lock-step, so the slot count must
    /// equal it.
    ///
    /// # Errors
    /// `InconsistentState` if the slot count diverged from the switch,
    /// `CapacityExceeded` when all slots are taken.
    pub fn register(
        &self,
        expected_index: usize,
        source: ConditionSource,
    ) -> Result<(), SupervisorError> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.len() != expected_index {
            return Err(SupervisorError::InconsistentState {
                slots: slots.len(),
                expected: expected_index,
            });
        }
        slots
            .push(source)
            .map_err(|_| SupervisorError::CapacityExceeded { max: MAX_SOLVERS })
    }

    /// Number of registered slots.
    pub fn slot_count(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Set the observed slot.
    ///
    /// # Errors
    /// `IndexOutOfRange` if `index` is beyond the registered slots.
    pub fn select(&self, index: usize) -> Result<(), SupervisorError> {
        let count = self.slot_count();
        if index >= count {
            return Err(SupervisorError::IndexOutOfRange { index, count });
        }
        self.observed.store(index, Ordering::Release);
        Ok(())
    }

    /// The currently observed slot, if any.
    pub fn observed(&self) -> Option<usize> {
        match self.observed.load(Ordering::Acquire) {
            UNSELECTED => None,
            index => Some(index),
        }
    }

    /// Force the condition false for all cycles strictly before `time`.
    #[inline]
    pub fn arm_at(&self, time: CycleTime) {
        tracing::debug!(evaluator = self.name, armed_at = time, "arming");
        self.armed_at.store(time, Ordering::Release);
    }

    /// The current arming time.
    pub fn armed_at(&self) -> CycleTime {
        self.armed_at.load(Ordering::Acquire)
    }

    /// Evaluate the condition at cycle time `now`.
    ///
    /// False while `now` is strictly before the armed time or no slot is
    /// selected; otherwise the observed slot's current sample.
    pub fn evaluate(&self, now: CycleTime) -> bool {
        if now < self.armed_at.load(Ordering::Acquire) {
            return false;
        }
        let index = self.observed.load(Ordering::Acquire);
        if index == UNSELECTED {
            return false;
        }
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .is_some_and(ConditionSource::sample)
    }
}

//! Simulated device for tests and the demo binary.
//!
//! First-order tracking model: each applied command pulls the position
//! toward it by a fixed fraction per cycle. Good enough to exercise the
//! supervisor's switching, arming and replay logic without hardware.

use sot_common::CycleTime;

use crate::cycle::Device;

/// Simulated robot device.
pub struct SimDevice {
    position: Vec<f64>,
    time: CycleTime,
    /// Per-cycle tracking gain in (0, 1]; 1.0 teleports to the command.
    tracking_gain: f64,
}

impl SimDevice {
    /// Create a device at the zero configuration.
    pub fn new(dof: usize) -> Self {
        Self {
            position: vec![0.0; dof],
            time: 0,
            tracking_gain: 0.2,
        }
    }

    /// Create a device at a given configuration.
    pub fn at_position(position: Vec<f64>) -> Self {
        Self {
            position,
            time: 0,
            tracking_gain: 0.2,
        }
    }

    /// Override the tracking gain.
    pub fn with_tracking_gain(mut self, gain: f64) -> Self {
        self.tracking_gain = gain;
        self
    }
}

impl Device for SimDevice {
    fn position(&self) -> &[f64] {
        &self.position
    }

    fn time(&self) -> CycleTime {
        self.time
    }

    fn apply(&mut self, command: &[f64]) {
        for (p, c) in self.position.iter_mut().zip(command) {
            *p += (c - *p) * self.tracking_gain;
        }
        self.time += 1;
    }
}

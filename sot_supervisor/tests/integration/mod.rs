//! Shared helpers for the supervisor integration tests.

mod replay;
mod transitions;

use std::sync::{Arc, Mutex};

use sot_common::CycleTime;
use sot_common::config::SupervisorConfig;
use sot_supervisor::queue::InputQueueSynchronizer;
use sot_supervisor::solver::{ConditionSource, Solver, SolverHandle};
use sot_supervisor::supervisor::Supervisor;

/// Test solver with a fixed command and configurable condition sources.
pub struct TestSolver {
    name: String,
    command: Vec<f64>,
    done: ConditionSource,
    error: ConditionSource,
}

impl Solver for TestSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute_command(&mut self, _position: &[f64], _now: CycleTime, out: &mut [f64]) {
        for (o, c) in out.iter_mut().zip(&self.command) {
            *o = *c;
        }
    }

    fn done_source(&self) -> ConditionSource {
        self.done.clone()
    }

    fn error_source(&self) -> ConditionSource {
        self.error.clone()
    }
}

/// A solver holding `command`, done constant true, error constant false.
pub fn solver(name: &str, command: Vec<f64>) -> SolverHandle {
    Arc::new(Mutex::new(TestSolver {
        name: name.to_string(),
        command,
        done: ConditionSource::Constant(true),
        error: ConditionSource::Constant(false),
    }))
}

/// A 2-dof supervisor with default config and a fresh queue.
pub fn supervisor() -> Supervisor {
    supervisor_with_dof(2)
}

pub fn supervisor_with_dof(dof: usize) -> Supervisor {
    let config = SupervisorConfig {
        dof,
        ..SupervisorConfig::default()
    };
    Supervisor::new(config, Arc::new(InputQueueSynchronizer::new()))
}

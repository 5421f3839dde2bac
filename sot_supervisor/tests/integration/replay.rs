//! Replay gating: minimum-fill wait, cursor placement, deferred done/error
//! arming and end-to-end trajectory replay through the cycle runner.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sot_common::config::SupervisorConfig;
use sot_common::error::SupervisorError;
use sot_supervisor::cycle::CycleRunner;
use sot_supervisor::queue::InputQueueSynchronizer;
use sot_supervisor::sim::SimDevice;
use sot_supervisor::solver::QueuedPostureSolver;
use sot_supervisor::supervisor::Supervisor;

use super::{solver, supervisor};

#[test]
fn negative_delay_is_rejected_without_queue_mutation() {
    let mut sup = supervisor();
    sup.queue().push("posture", 0, vec![0.0, 0.0]);

    let err = sup.start_replay(-5, 1, 1.0).unwrap_err();
    assert!(matches!(err, SupervisorError::Validation(_)));
    assert_eq!(sup.queue().replay_start(), None);
    assert_eq!(sup.queue().queue_size("posture"), 1);
}

#[test]
fn replay_cursor_and_arming_window() {
    let mut sup = supervisor();
    sup.add_main_solver("traj", solver("traj", vec![0.0, 0.0]))
        .unwrap();
    sup.select_state("traj", false).unwrap();

    for t in 0..4 {
        sup.queue().push("posture", t, vec![0.0, 0.0]);
    }
    sup.mirror().update(1000, &[0.0, 0.0]);

    // delay 5, duration 0.01 s at 1 ms period → 10 cycles.
    sup.start_replay(5, 4, 0.01).unwrap();
    assert_eq!(sup.queue().replay_start(), Some(1005));

    // Done (constant true) is forced false for all cycles strictly before
    // replay start + duration.
    let done = sup.done_events();
    for t in 1000..1015 {
        assert!(!done.evaluate(t), "done fired early at cycle {t}");
    }
    assert!(done.evaluate(1015));
    assert!(!sup.error_events().evaluate(1014));
}

#[test]
fn start_replay_blocks_until_minimum_fill() {
    let mut sup = supervisor();
    sup.add_main_solver("traj", solver("traj", vec![0.0, 0.0]))
        .unwrap();
    sup.select_state("traj", false).unwrap();

    let queue = sup.queue();
    let producer = thread::spawn(move || {
        for t in 0..10 {
            thread::sleep(Duration::from_millis(1));
            queue.push("posture", t, vec![0.0, 0.0]);
        }
    });

    // Returns only once 10 samples are buffered.
    sup.start_replay(0, 10, 0.001).unwrap();
    assert!(sup.queue().queue_size("posture") >= 10);
    producer.join().unwrap();
}

#[test]
fn stop_replay_hides_the_stream_and_clear_drains_it() {
    let sup = supervisor();
    let queue = sup.queue();
    queue.push("posture", 0, vec![1.0, 1.0]);
    queue.start_replay_at(0);

    sup.stop_replay();
    assert_eq!(queue.read_up_to("posture", 100), None);
    assert_eq!(queue.queue_size("posture"), 1);

    sup.clear_queues();
    assert_eq!(queue.queue_size("posture"), 0);
}

#[test]
fn trajectory_replay_end_to_end() {
    let config = SupervisorConfig {
        dof: 2,
        ..SupervisorConfig::default()
    };
    let queue = Arc::new(InputQueueSynchronizer::new());
    let mut sup = Supervisor::new(config.clone(), queue.clone());

    sup.mirror().update(0, &[0.0, 0.0]);
    sup.make_initial_sot().unwrap();

    let traj = QueuedPostureSolver::new("traj", "posture", queue.clone(), 2);
    sup.add_main_solver("reach", Arc::new(std::sync::Mutex::new(traj)))
        .unwrap();

    // Ramp over 10 cycles, starting right at the replay cursor.
    let delay = 3;
    for i in 0..10 {
        let v = (i + 1) as f64 * 0.1;
        queue.push("posture", delay + i, vec![v, -v]);
    }

    sup.select_state("reach", false).unwrap();
    // 10 cycles worth of duration at the default 1 ms period.
    sup.start_replay(delay, 10, 0.010).unwrap();

    let mut runner = CycleRunner::new(&sup);
    let mut device = SimDevice::new(2).with_tracking_gain(1.0);

    let mut done_at = None;
    for _ in 0..20 {
        let outcome = runner.run_cycle(&mut device).unwrap();
        if outcome.done && done_at.is_none() {
            done_at = Some(outcome.time);
        }
    }

    // The last ramp sample was applied once visible.
    assert_eq!(runner.last_command(), &[1.0, -1.0]);
    // Done (constant true) fired exactly when the armed time passed:
    // replay start (3) + duration (10 cycles).
    assert_eq!(done_at, Some(13));
}

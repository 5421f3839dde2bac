//! # SoT Supervisor demo
//!
//! Wires the supervisor to a simulated device and runs a small scenario:
//! hold the initial posture, replay a buffered reference trajectory through
//! a queued solver, then fall back to holding posture.
//!
//! The control cycle runs on its own thread (optionally with PREEMPT_RT
//! scheduling via the `rt` feature); all transition requests are issued
//! from the main (supervisory) thread.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sot_common::config::{ConfigError, SupervisorConfig};
use sot_supervisor::cycle::{CycleRunner, rt_setup};
use sot_supervisor::queue::InputQueueSynchronizer;
use sot_supervisor::sim::SimDevice;
use sot_supervisor::solver::QueuedPostureSolver;
use sot_supervisor::supervisor::Supervisor;

/// SoT Supervisor — event-driven stack-of-tasks scheduling demo
#[derive(Parser, Debug)]
#[command(name = "sot_supervisor")]
#[command(version)]
#[command(about = "Supervises solver transitions over a simulated control loop")]
struct Args {
    /// Path to the supervisor configuration TOML.
    #[arg(default_value = "config/supervisor.toml")]
    config: PathBuf,

    /// CPU core to pin the cycle thread to (rt builds only).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt builds only).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Replay trajectory duration [s].
    #[arg(long, default_value_t = 2.0)]
    replay_secs: f64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("SoT Supervisor v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("SoT Supervisor shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match SupervisorConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) => {
            warn!(
                "No config at '{}', using defaults",
                args.config.display()
            );
            SupervisorConfig::default()
        }
        Err(e) => return Err(Box::new(e)),
    };
    info!(
        "Config OK: cycle_time={}µs, dof={}",
        config.cycle_time_us, config.dof
    );

    let queue = Arc::new(InputQueueSynchronizer::new());
    let mut supervisor = Supervisor::new(config.clone(), queue.clone());
    supervisor.make_initial_sot()?;

    let reach = QueuedPostureSolver::new(
        "sot_reach",
        config.primary_channel.clone(),
        queue.clone(),
        config.dof,
    );
    supervisor.add_main_solver("reach", Arc::new(std::sync::Mutex::new(reach)))?;

    let runner = CycleRunner::new(&supervisor);
    info!("CycleRunner initialized, starting cycle thread");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let cycle_thread = spawn_cycle_thread(
        runner,
        config.clone(),
        running.clone(),
        args.cpu_core,
        args.rt_priority,
    );

    // ── Supervisory scenario ────────────────────────────────────────
    let mirror = supervisor.mirror();
    let delay_cycles: i64 = 50;
    let samples = (args.replay_secs / config.time_step_secs()) as i64;

    // Let the keep-posture hold settle for a moment.
    thread::sleep(Duration::from_millis(200));

    // Buffer a smooth reach trajectory timestamped after the replay delay.
    let start_estimate = mirror.now() + delay_cycles;
    for i in 0..samples {
        let phase = i as f64 / samples as f64;
        let target: Vec<f64> = (0..config.dof)
            .map(|j| 0.5 * (1.0 - (std::f64::consts::PI * phase).cos()) * (j + 1) as f64 * 0.1)
            .collect();
        queue.push(&config.primary_channel, start_estimate + i, target);
    }
    info!(
        buffered = queue.queue_size(&config.primary_channel),
        "trajectory buffered"
    );

    supervisor.select_state("reach", false)?;
    supervisor.start_replay(delay_cycles, samples as usize / 2, args.replay_secs)?;

    // Wait out the replay, then hold posture again.
    let margin = Duration::from_millis(500);
    thread::sleep(Duration::from_secs_f64(args.replay_secs) + margin);
    supervisor.select_state("", false)?;
    supervisor.clear_queues();

    thread::sleep(Duration::from_millis(200));
    running.store(false, Ordering::SeqCst);
    if let Err(e) = cycle_thread.join() {
        error!("cycle thread panicked: {e:?}");
    }
    Ok(())
}

/// Run the control cycle at the configured period until `running` clears.
fn spawn_cycle_thread(
    mut runner: CycleRunner,
    config: SupervisorConfig,
    running: Arc<AtomicBool>,
    cpu_core: usize,
    rt_priority: i32,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = rt_setup(cpu_core, rt_priority) {
            warn!("RT setup unavailable, continuing best-effort: {e}");
        }

        let period = Duration::from_micros(config.cycle_time_us);
        let budget_ns = period.as_nanos() as i64;
        let mut device = SimDevice::new(config.dof);
        let mut next = Instant::now() + period;
        let mut was_done = false;

        while running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            match runner.run_cycle(&mut device) {
                Ok(outcome) => {
                    if outcome.done && !was_done {
                        info!(cycle = outcome.time, "done condition fired");
                    }
                    if outcome.error {
                        warn!(cycle = outcome.time, "error condition active");
                    }
                    was_done = outcome.done;
                }
                Err(e) => {
                    // Supervisory misconfiguration; the device keeps its
                    // last command, the loop keeps its pace.
                    error!("cycle skipped: {e}");
                }
            }
            runner
                .stats
                .record(cycle_start.elapsed().as_nanos() as i64, budget_ns);

            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
            next += period;
        }

        info!(
            cycles = runner.stats.cycle_count,
            avg_ns = runner.stats.avg_cycle_ns(),
            max_ns = runner.stats.max_cycle_ns,
            overruns = runner.stats.overruns,
            "cycle thread stopped"
        );
    })
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

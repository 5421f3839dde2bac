//! # SoT Supervisor Library
//!
//! Supervises the consecutive execution of several stack-of-tasks control
//! policies ("solvers") driving one robot. At every control cycle exactly one
//! solver's command vector reaches the device; an event-driven transition
//! table switches between solvers without ever leaving the robot uncontrolled
//! or fed two conflicting commands.
//!
//! ## Components
//!
//! - [`solver`] — the solver contract, condition sources and built-in solvers
//! - [`events`] — per-cycle done/error condition evaluation with deferred
//!   ("future-time") arming
//! - [`switch`] — the glitch-free single-active-input output switch
//! - [`supervisor`] — solver registry, transition table and the supervisory
//!   API (`select_state`, `run_pre_action`, `run_post_action`, replay control)
//! - [`queue`] — buffered external trajectory feed with minimum-fill gating
//!   and delayed replay start
//! - [`cycle`] — the deterministic per-cycle runner, device boundary and RT
//!   setup
//! - [`sim`] — simulated device for tests and the demo binary
//!
//! ## Execution contexts
//!
//! Two contexts exist. The periodic real-time cycle ([`cycle::CycleRunner`])
//! only reads the currently selected switch input and the armed/observed
//! condition values; it never blocks. All mutation (state selection, arming,
//! registration) happens in the supervisory context via [`supervisor::Supervisor`].
//! Switch selection is a single atomic store, observed by the cycle either
//! fully before or fully after a given cycle's read.

#![deny(clippy::disallowed_types)]

pub mod cycle;
pub mod events;
pub mod queue;
pub mod sim;
pub mod solver;
pub mod supervisor;
pub mod switch;

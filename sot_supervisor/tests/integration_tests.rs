//! Integration tests for the SoT supervisor.
//!
//! These tests exercise multiple modules together: registry + switch +
//! evaluators + queue + cycle runner, over realistic transition scenarios.

mod integration;

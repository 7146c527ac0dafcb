//! Integration tests for cellbench
//!
//! These tests run complete scenarios through the simulation driver and check
//! the harness contracts end to end: delay sample bounds, throughput bounds,
//! untagged traffic handling, technology independence, and failure exit codes.

#[path = "integration/latency_scenarios.rs"]
mod latency_scenarios;

#[path = "integration/throughput_scenarios.rs"]
mod throughput_scenarios;

#[path = "integration/untagged_traffic.rs"]
mod untagged_traffic;

#[path = "integration/technology_swap.rs"]
mod technology_swap;

#[path = "integration/failure_modes.rs"]
mod failure_modes;

#[path = "integration/properties.rs"]
mod properties;

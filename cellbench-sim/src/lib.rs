//! Cellbench Simulation - deterministic radio network simulator and driver.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! This crate runs harness scenarios against an in-process radio network:
//! a backhaul peer sends a fixed-rate datagram flow over wired segments and a
//! radio downlink to a terminal, where a sink counts it and a correlator turns
//! packet timestamps into one-way delay samples.
//!
//! # Features
//!
//! - **Deterministic Execution**: Same seed always produces identical results
//! - **Event-Based Simulation**: One clock, strict `(time, priority, id)` ordering
//! - **Two Radio Generations**: Wide-area cellular and short-range high-band
//!   behind one attach and bearer activation sequence
//! - **Explicit Instrumentation**: Tagger and correlator subscribe to the
//!   generator and the sink instead of a global registry
//!
//! # Example
//!
//! ```rust,no_run
//! use cellbench_core::HarnessConfig;
//! use cellbench_sim::SimulationDriver;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut driver = SimulationDriver::new(HarnessConfig::wide_area_latency());
//! let report = driver.run()?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod activator;
pub mod applications;
pub mod configurator;
pub mod deterministic;
pub mod driver;
pub mod instrumentation;
pub mod network;

pub use activator::BearerActivator;
pub use applications::{EgressObserver, IngressObserver, SinkCounters, UdpGenerator, UdpSink};
pub use deterministic::{
    DeterministicClock, DeterministicRng, EventClock, EventPriority, EventStatistics, EventType,
    SimulationError, SimulationEvent,
};
pub use driver::{DriverState, ScenarioReport, SimulationDriver};
pub use instrumentation::{DelayCorrelator, SampleRecorder, TimestampTagger};
pub use network::{Datagram, RadioNetwork, RadioProfile, WiredSegment};

use cellbench_core::{HarnessConfig, Result};

/// Runs one scenario with a fresh driver.
///
/// # Errors
///
/// - `HarnessError` - Any configuration, attachment, bearer, or simulation failure
pub fn run_scenario(config: HarnessConfig) -> Result<ScenarioReport> {
    SimulationDriver::new(config).run()
}

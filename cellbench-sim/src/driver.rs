//! Simulation driver.
//!
//! Wires topology, radio access, addressing, and the traffic applications
//! into a scheduled scenario, runs the event clock until the stop time, and
//! aggregates the metrics exactly once.

use std::cell::Cell;
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;

use cellbench_core::metrics::MeasurementWindow;
use cellbench_core::topology::build_topology;
use cellbench_core::{
    AddressMap, AggregateMetrics, DelaySample, DropReason, HarnessConfig, HarnessError, NodeId,
    RadioTechnology, Result, SimTime, TrafficCounters,
};
use serde::Serialize;

use crate::activator::BearerActivator;
use crate::applications::{UdpGenerator, UdpSink};
use crate::configurator::{assign_addresses, install_route};
use crate::deterministic::{EventClock, EventPriority, EventStatistics, EventType, SimulationError};
use crate::instrumentation::{DelayCorrelator, SampleRecorder, TimestampTagger};
use crate::network::{Datagram, RadioNetwork, WIRED_INTERFACE, WiredSegment};

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    /// Building topology, bearers, addressing, and applications
    Configuring,
    /// Start and stop times registered with the event clock
    Scheduled,
    /// Event clock advancing
    Running,
    /// Stop time reached or no events left; metrics are computed here
    Stopped,
    /// Clock and resources released
    Terminal,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Configuring => "configuring",
            DriverState::Scheduled => "scheduled",
            DriverState::Running => "running",
            DriverState::Stopped => "stopped",
            DriverState::Terminal => "terminal",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Radio generation the scenario ran with
    pub technology: RadioTechnology,
    /// Seed of the radio model's RNG
    pub seed: u64,
    /// Throughput and latency figures
    pub metrics: AggregateMetrics,
    /// Every address assigned during configuration
    pub addresses: AddressMap,
    /// Events processed by the clock
    pub events: EventStatistics,
    /// Driver state when the report was produced
    pub final_state: DriverState,
    /// Simulation time at which the run stopped
    pub elapsed: SimTime,
    /// Raw delay samples in arrival order
    #[serde(skip)]
    pub samples: Vec<DelaySample>,
}

impl ScenarioReport {
    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "Scenario Report ({}, seed: {})\n",
            self.technology, self.seed
        ));
        summary.push_str(&format!("Stopped at: {}\n", self.elapsed));
        summary.push_str(&format!("Events processed: {}\n", self.events.events_processed));
        summary.push_str(&self.metrics.summary());
        summary
    }
}

/// Everything built while configuring.
struct Scenario {
    network: RadioNetwork,
    generator: UdpGenerator,
    sink: UdpSink,
    recorder: SampleRecorder,
    untagged: Rc<Cell<u64>>,
    addresses: AddressMap,
}

/// Runs one harness scenario from configuration to report.
#[derive(Debug)]
pub struct SimulationDriver {
    config: HarnessConfig,
    state: DriverState,
}

impl SimulationDriver {
    /// Creates a driver in the configuring state.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: DriverState::Configuring,
        }
    }

    /// Current state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Configuration this driver runs.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn transition(&mut self, next: DriverState) {
        tracing::info!(from = %self.state, to = %next, "Driver state change");
        self.state = next;
    }

    /// Runs the scenario to completion.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Invalid configuration, or the driver already ran
    /// - `HarnessError::Attachment` - The terminal could not attach
    /// - `HarnessError::BearerActivation` - The bearer could not be established
    /// - `HarnessError::SimulationAbort` - The event clock failed; carries incomplete metrics
    pub fn run(&mut self) -> Result<ScenarioReport> {
        if self.state != DriverState::Configuring {
            return Err(HarnessError::configuration(format!(
                "driver is {} and cannot run again",
                self.state
            )));
        }

        let mut scenario = match self.configure() {
            Ok(scenario) => scenario,
            Err(error) => {
                tracing::warn!(%error, "Scenario configuration failed");
                self.transition(DriverState::Terminal);
                return Err(error);
            }
        };

        let mut clock = EventClock::new(self.config.simulation.max_events);
        if let Err(error) = self.schedule(&mut clock) {
            return Err(self.abort(&mut clock, &scenario, TrafficCounters::default(), error));
        }
        self.transition(DriverState::Scheduled);

        self.transition(DriverState::Running);
        let mut counters = TrafficCounters::default();
        if let Err(error) = self.execute(&mut clock, &mut scenario, &mut counters) {
            return Err(self.abort(&mut clock, &scenario, counters, error));
        }

        self.transition(DriverState::Stopped);
        let elapsed = clock.now();
        let samples = scenario.recorder.snapshot();
        let metrics = self.aggregate(&scenario, counters, &samples);
        tracing::info!(
            sent = metrics.total_sent,
            received = metrics.total_received,
            throughput_mbps = metrics.throughput_mbps(),
            "Metrics aggregated"
        );

        let events = clock.statistics().clone();
        clock.destroy();
        self.transition(DriverState::Terminal);

        Ok(ScenarioReport {
            technology: self.config.radio.technology,
            seed: self.config.simulation.seed,
            metrics,
            addresses: scenario.addresses,
            events,
            final_state: self.state,
            elapsed,
            samples,
        })
    }

    fn configure(&self) -> Result<Scenario> {
        let config = &self.config;
        config.validate()?;

        let topology = build_topology(config.topology.backhaul)?;
        let technology = config.radio.technology;
        let mut network = RadioNetwork::new(
            technology,
            topology.core_anchor(),
            config.topology.terminal_pool,
            config.simulation.seed,
        )?;
        network.install_link(WiredSegment::Backhaul, config.topology.backhaul)?;
        network.install_link(WiredSegment::Transport, config.topology.transport_link())?;

        let activator = BearerActivator::new(technology);
        let terminal = topology.terminal();
        activator.install_base_station(
            &mut network,
            topology.base_station(),
            config.radio.base_station_position,
        )?;
        activator.install_terminal(&mut network, terminal, config.radio.terminal_position())?;

        let target = (!config.radio.attach_nearest).then_some(topology.base_station());
        activator.attach(&mut network, terminal, target)?;
        activator.activate_bearer(
            &mut network,
            terminal,
            config.radio.qos,
            config.radio.filter,
            config.radio.max_bitrate_bps,
        )?;

        let addresses = assign_addresses(&mut network, &topology, config.topology.backhaul_subnet)?;
        let peer = topology.backhaul_peer();
        install_route(
            &mut network,
            peer,
            config.topology.terminal_pool,
            WIRED_INTERFACE,
        )?;

        let destination = terminal_address(&addresses, terminal)?;
        let flow = config.traffic.flow.clone();
        let mut generator = UdpGenerator::new(peer, flow.clone(), destination);
        if config.traffic.tagging {
            generator.subscribe(Box::new(TimestampTagger::new()));
        }

        let recorder = SampleRecorder::new();
        let mut sink = UdpSink::new(terminal, flow.sink_port);
        sink.measure_within(MeasurementWindow {
            start: flow.start,
            stop: flow.stop,
        });
        let correlator = DelayCorrelator::new(recorder.clone());
        let untagged = correlator.untagged_counter();
        sink.subscribe(Box::new(correlator));

        tracing::info!(
            %technology,
            %destination,
            packet_size = flow.packet_size,
            interval = ?flow.interval,
            "Scenario configured"
        );

        Ok(Scenario {
            network,
            generator,
            sink,
            recorder,
            untagged,
            addresses,
        })
    }

    fn schedule(&self, clock: &mut EventClock) -> std::result::Result<(), SimulationError> {
        let traffic = &self.config.traffic;
        clock.schedule_at(traffic.sink_start, EventType::SinkStart, EventPriority::High)?;
        clock.schedule_at(traffic.sink_stop, EventType::SinkStop, EventPriority::High)?;
        clock.schedule_at(
            traffic.flow.start,
            EventType::GeneratorStart,
            EventPriority::High,
        )?;
        clock.schedule_at(
            traffic.flow.stop,
            EventType::GeneratorStop,
            EventPriority::High,
        )?;
        clock.stop_at(self.config.simulation.duration)?;
        Ok(())
    }

    fn execute(
        &self,
        clock: &mut EventClock,
        scenario: &mut Scenario,
        counters: &mut TrafficCounters,
    ) -> std::result::Result<(), SimulationError> {
        while let Some(event) = clock.next_event()? {
            let now = clock.now();
            match event.event_type {
                EventType::Stop => {
                    tracing::debug!(at = %now, "Stop time reached");
                    return Ok(());
                }
                EventType::SinkStart => scenario.sink.start(),
                EventType::SinkStop => scenario.sink.stop(),
                EventType::GeneratorStart => {
                    scenario.generator.start();
                    clock.schedule_at(now, EventType::GeneratorSend, EventPriority::Normal)?;
                }
                EventType::GeneratorStop => scenario.generator.stop(),
                EventType::GeneratorSend => {
                    if let Some(packet) = scenario.generator.emit(now) {
                        counters.packets_sent += 1;
                        let mut datagram = Datagram {
                            packet,
                            destination: scenario.generator.destination(),
                            port: scenario.generator.flow().sink_port,
                        };
                        let source = scenario.generator.node();
                        match scenario.network.send_from(now, source, &mut datagram) {
                            Ok(arrival) => {
                                clock.schedule_at(
                                    arrival,
                                    EventType::AnchorArrival { datagram },
                                    EventPriority::Normal,
                                )?;
                            }
                            Err(reason) => drop_packet(counters, &datagram, reason),
                        }
                    }
                    if let Some(next) = scenario.generator.next_send_time(now) {
                        clock.schedule_at(next, EventType::GeneratorSend, EventPriority::Normal)?;
                    }
                }
                EventType::AnchorArrival { mut datagram } => {
                    match scenario.network.forward_at_anchor(now, &mut datagram) {
                        Ok(arrival) => {
                            clock.schedule_at(
                                arrival,
                                EventType::BaseStationArrival { datagram },
                                EventPriority::Normal,
                            )?;
                        }
                        Err(reason) => drop_packet(counters, &datagram, reason),
                    }
                }
                EventType::BaseStationArrival { datagram } => {
                    match scenario.network.transmit_radio(now, &datagram) {
                        Ok(arrival) => {
                            clock.schedule_at(
                                arrival,
                                EventType::TerminalDelivery { datagram },
                                EventPriority::Normal,
                            )?;
                        }
                        Err(reason) => drop_packet(counters, &datagram, reason),
                    }
                }
                EventType::TerminalDelivery { datagram } => {
                    if let Err(reason) =
                        scenario.sink.receive(now, datagram.port, &datagram.packet)
                    {
                        drop_packet(counters, &datagram, reason);
                    }
                }
            }
        }

        tracing::debug!(at = %clock.now(), "No events left");
        Ok(())
    }

    fn aggregate(
        &self,
        scenario: &Scenario,
        mut counters: TrafficCounters,
        samples: &[DelaySample],
    ) -> AggregateMetrics {
        let sink = scenario.sink.counters();
        counters.packets_received = sink.packets;
        counters.bytes_received = sink.bytes;
        counters.received_in_window = sink.in_window;
        counters.tagged_received = sink.tagged;
        counters.untagged_received = scenario.untagged.get();

        let flow = &self.config.traffic.flow;
        let window = MeasurementWindow {
            start: flow.start,
            stop: flow.stop,
        };
        AggregateMetrics::compute(&counters, samples, window, flow.packet_size)
    }

    fn abort(
        &mut self,
        clock: &mut EventClock,
        scenario: &Scenario,
        counters: TrafficCounters,
        error: SimulationError,
    ) -> HarnessError {
        tracing::error!(%error, at = %clock.now(), "Simulation aborted");
        let samples = scenario.recorder.snapshot();
        let partial = self.aggregate(scenario, counters, &samples).into_incomplete();
        clock.destroy();
        self.transition(DriverState::Terminal);

        HarnessError::SimulationAbort {
            reason: error.to_string(),
            partial: Some(Box::new(partial)),
        }
    }
}

fn terminal_address(addresses: &AddressMap, terminal: NodeId) -> Result<Ipv4Addr> {
    addresses
        .primary(terminal)
        .ok_or_else(|| HarnessError::configuration(format!("{terminal} has no address")))
}

fn drop_packet(counters: &mut TrafficCounters, datagram: &Datagram, reason: DropReason) {
    tracing::debug!(uid = datagram.packet.uid(), %reason, "Packet dropped");
    counters.record_drop(reason);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cellbench_core::{PacketLimit, Preset};

    use super::*;

    fn short_latency_run() -> HarnessConfig {
        let mut config = HarnessConfig::short_range_latency();
        config.traffic.flow.limit = PacketLimit::Count(5);
        config
    }

    #[test]
    fn test_run_reaches_terminal_state() {
        let mut driver = SimulationDriver::new(short_latency_run());
        assert_eq!(driver.state(), DriverState::Configuring);

        let report = driver.run().unwrap();

        assert_eq!(driver.state(), DriverState::Terminal);
        assert_eq!(report.final_state, DriverState::Terminal);
        assert!(report.metrics.complete);
        assert_eq!(report.metrics.total_sent, 5);
        assert!(report.metrics.total_received <= report.metrics.total_sent);
        assert_eq!(report.events.count("Stop"), 1);
    }

    #[test]
    fn test_driver_runs_once() {
        let mut driver = SimulationDriver::new(short_latency_run());
        driver.run().unwrap();
        assert!(matches!(
            driver.run(),
            Err(HarnessError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_configuration_aborts_before_scheduling() {
        let mut config = short_latency_run();
        config.traffic.flow.interval = Duration::ZERO;
        let mut driver = SimulationDriver::new(config);

        assert!(matches!(
            driver.run(),
            Err(HarnessError::Configuration { .. })
        ));
        assert_eq!(driver.state(), DriverState::Terminal);
    }

    #[test]
    fn test_event_limit_aborts_with_partial_metrics() {
        let mut config = Preset::WideAreaLatency.config();
        config.simulation.max_events = 20;
        let mut driver = SimulationDriver::new(config);

        let error = driver.run().unwrap_err();

        assert_eq!(error.exit_code(), 5);
        let partial = error.partial_metrics().unwrap();
        assert!(!partial.complete);
        assert_eq!(driver.state(), DriverState::Terminal);
    }

    #[test]
    fn test_samples_match_tagged_receipts() {
        let report = SimulationDriver::new(short_latency_run()).run().unwrap();
        assert_eq!(report.samples.len() as u64, report.metrics.tagged_received);
        for sample in &report.samples {
            assert!(sample.received_at <= report.elapsed);
        }
    }

    #[test]
    fn test_interval_longer_than_the_window_sends_once() {
        let mut config = Preset::WideAreaLatency.config();
        config.traffic.flow.limit = PacketLimit::Count(100);
        config.traffic.flow.interval = Duration::from_micros(18_446_744_073_709_552);

        let report = SimulationDriver::new(config).run().unwrap();

        assert_eq!(report.metrics.total_sent, 1);
        assert!(report.metrics.total_received <= 1);
    }

    #[test]
    fn test_untagged_arrivals_reach_the_report() {
        let mut config = short_latency_run();
        config.traffic.tagging = false;

        let report = SimulationDriver::new(config).run().unwrap();

        assert!(report.metrics.total_received > 0);
        assert_eq!(report.metrics.untagged_received, report.metrics.total_received);
        assert!(report.summary().contains("Untagged arrivals"));

        let tagged = SimulationDriver::new(short_latency_run()).run().unwrap();
        assert_eq!(tagged.metrics.untagged_received, 0);
    }

    #[test]
    fn test_summary_mentions_throughput_and_latency() {
        let report = SimulationDriver::new(short_latency_run()).run().unwrap();
        let summary = report.summary();
        assert!(summary.contains("Throughput:"));
        assert!(summary.contains("Latency"));
        assert!(!summary.contains("INCOMPLETE"));
    }
}

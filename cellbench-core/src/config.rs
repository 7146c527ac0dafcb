//! Centralized configuration for cellbench scenarios.
//!
//! Every tunable of a run lives here, grouped into sections. The four presets
//! reproduce the reference latency and throughput scenarios for each radio
//! technology; environment variables and CLI flags override them.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::addressing::{
    Ipv4Subnet, SHORT_RANGE_BACKHAUL_SUBNET, TERMINAL_POOL, WIDE_AREA_BACKHAUL_SUBNET,
};
use crate::radio::{Position, QosClass, RadioTechnology, TrafficFilter};
use crate::time::SimTime;
use crate::topology::LinkParams;
use crate::traffic::{Flow, PacketLimit};
use crate::{HarnessError, Result};

/// Destination port of the counting sink.
pub const DEFAULT_SINK_PORT: u16 = 1234;

/// Central configuration for one scenario run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarnessConfig {
    pub topology: TopologyConfig,
    pub radio: RadioConfig,
    pub traffic: TrafficConfig,
    pub simulation: SimulationConfig,
}

/// Wired segments and address plan.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyConfig {
    /// Backhaul peer to core anchor link
    pub backhaul: LinkParams,
    /// Core anchor to base station segment; reuses the backhaul when unset
    pub transport: Option<LinkParams>,
    pub backhaul_subnet: Ipv4Subnet,
    pub terminal_pool: Ipv4Subnet,
}

impl TopologyConfig {
    /// Effective parameters of the anchor to base station segment.
    pub fn transport_link(&self) -> LinkParams {
        self.transport.unwrap_or(self.backhaul)
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            backhaul: LinkParams::new(1_000_000_000, Duration::from_millis(30)),
            transport: None,
            backhaul_subnet: WIDE_AREA_BACKHAUL_SUBNET,
            terminal_pool: TERMINAL_POOL,
        }
    }
}

/// Radio access placement and bearer request.
#[derive(Debug, Clone, Serialize)]
pub struct RadioConfig {
    pub technology: RadioTechnology,
    pub base_station_position: Position,
    /// Horizontal distance between the base station and the terminal, in metres
    pub terminal_distance_m: f64,
    pub terminal_height_m: f64,
    /// Let the collaborator pick the nearest base station instead of naming one
    pub attach_nearest: bool,
    pub qos: QosClass,
    pub filter: TrafficFilter,
    pub max_bitrate_bps: Option<u64>,
}

impl RadioConfig {
    /// Switches technology, moving the base station to that technology's mast
    /// height and picking its attach mode.
    pub fn set_technology(&mut self, technology: RadioTechnology) {
        self.technology = technology;
        self.base_station_position.z = base_station_height_m(technology);
        self.attach_nearest = technology.supports_nearest_attach();
    }

    pub fn terminal_position(&self) -> Position {
        Position::new(
            self.base_station_position.x + self.terminal_distance_m,
            self.base_station_position.y,
            self.terminal_height_m,
        )
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            technology: RadioTechnology::WideAreaCellular,
            base_station_position: Position::new(0.0, 0.0, 30.0),
            terminal_distance_m: 10.0,
            terminal_height_m: 1.5,
            attach_nearest: false,
            qos: QosClass::VideoDefault,
            filter: TrafficFilter::bidirectional(),
            max_bitrate_bps: None,
        }
    }
}

/// Mast height used for a technology's base station.
pub fn base_station_height_m(technology: RadioTechnology) -> f64 {
    match technology {
        RadioTechnology::WideAreaCellular => 30.0,
        RadioTechnology::ShortRangeHighBand => 10.0,
    }
}

/// Generator flow and sink window.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficConfig {
    pub flow: Flow,
    /// Attach timestamp tags to generated packets
    pub tagging: bool,
    pub sink_start: SimTime,
    pub sink_stop: SimTime,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            flow: Flow {
                packet_size: 512,
                limit: PacketLimit::Count(100),
                interval: Duration::from_millis(100),
                start: SimTime::from_millis(2000),
                stop: SimTime::from_millis(3900),
                sink_port: DEFAULT_SINK_PORT,
            },
            tagging: true,
            sink_start: SimTime::from_millis(500),
            sink_stop: SimTime::from_millis(4000),
        }
    }
}

/// Event clock settings.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationConfig {
    /// Simulation stop time
    pub duration: SimTime,
    /// Seed of the radio channel's random number generator
    pub seed: u64,
    /// Upper bound on processed events before the run is aborted
    pub max_events: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: SimTime::from_millis(4000),
            seed: 42,
            max_events: 10_000_000,
        }
    }
}

/// Named reference scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Wide-area cellular, 512 B every 100 ms over a 30 ms backhaul
    WideAreaLatency,
    /// Wide-area cellular, 1500 B every 10 us over a 10 Gbps backhaul
    WideAreaThroughput,
    /// Short-range high band, 512 B every 100 ms over a 1 ms backhaul
    ShortRangeLatency,
    /// Short-range high band, 1500 B every 10 us over a 100 Gbps backhaul
    ShortRangeThroughput,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::WideAreaLatency,
        Preset::WideAreaThroughput,
        Preset::ShortRangeLatency,
        Preset::ShortRangeThroughput,
    ];

    pub fn config(self) -> HarnessConfig {
        match self {
            Preset::WideAreaLatency => HarnessConfig::wide_area_latency(),
            Preset::WideAreaThroughput => HarnessConfig::wide_area_throughput(),
            Preset::ShortRangeLatency => HarnessConfig::short_range_latency(),
            Preset::ShortRangeThroughput => HarnessConfig::short_range_throughput(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::WideAreaLatency => {
                "wide-area cellular, 100 x 512 B every 100 ms, 1 Gbps / 30 ms backhaul"
            }
            Preset::WideAreaThroughput => {
                "wide-area cellular, 1500 B every 10 us, 10 Gbps / 1 ms backhaul, QCI 1 bearer"
            }
            Preset::ShortRangeLatency => {
                "short-range high band, 100 x 512 B every 100 ms, 1 Gbps / 1 ms backhaul"
            }
            Preset::ShortRangeThroughput => {
                "short-range high band, 1500 B every 10 us, 100 Gbps / 100 us backhaul"
            }
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::WideAreaLatency => "wide-area-latency",
            Preset::WideAreaThroughput => "wide-area-throughput",
            Preset::ShortRangeLatency => "short-range-latency",
            Preset::ShortRangeThroughput => "short-range-throughput",
        };
        write!(f, "{name}")
    }
}

/// Flood flow shared by both throughput presets.
fn flood_traffic(sink_start: SimTime) -> TrafficConfig {
    TrafficConfig {
        flow: Flow {
            packet_size: 1500,
            limit: PacketLimit::Count(1_000_000),
            interval: Duration::from_micros(10),
            start: SimTime::from_millis(2500),
            stop: SimTime::from_millis(6000),
            sink_port: DEFAULT_SINK_PORT,
        },
        tagging: true,
        sink_start,
        sink_stop: SimTime::from_millis(6500),
    }
}

impl HarnessConfig {
    /// 100 small packets towards a wide-area terminal 10 m from the mast.
    pub fn wide_area_latency() -> Self {
        Self::default()
    }

    /// Saturating flood over a guaranteed bit rate voice bearer.
    pub fn wide_area_throughput() -> Self {
        Self {
            topology: TopologyConfig {
                backhaul: LinkParams::new(10_000_000_000, Duration::from_millis(1)),
                ..Default::default()
            },
            radio: RadioConfig {
                qos: QosClass::ConversationalVoice,
                ..Default::default()
            },
            traffic: flood_traffic(SimTime::from_millis(500)),
            simulation: SimulationConfig {
                duration: SimTime::from_millis(6500),
                ..Default::default()
            },
        }
    }

    /// Latency probe towards a short-range terminal attached to the nearest base station.
    pub fn short_range_latency() -> Self {
        let mut radio = RadioConfig {
            terminal_distance_m: 5.0,
            ..Default::default()
        };
        radio.set_technology(RadioTechnology::ShortRangeHighBand);

        Self {
            topology: TopologyConfig {
                backhaul: LinkParams::new(1_000_000_000, Duration::from_millis(1)),
                backhaul_subnet: SHORT_RANGE_BACKHAUL_SUBNET,
                ..Default::default()
            },
            radio,
            ..Default::default()
        }
    }

    /// Saturating flood towards a short-range terminal.
    pub fn short_range_throughput() -> Self {
        let mut radio = RadioConfig::default();
        radio.set_technology(RadioTechnology::ShortRangeHighBand);

        Self {
            topology: TopologyConfig {
                backhaul: LinkParams::new(100_000_000_000, Duration::from_micros(100)),
                backhaul_subnet: SHORT_RANGE_BACKHAUL_SUBNET,
                ..Default::default()
            },
            radio,
            traffic: flood_traffic(SimTime::from_millis(1000)),
            simulation: SimulationConfig {
                duration: SimTime::from_millis(6500),
                ..Default::default()
            },
        }
    }

    /// Creates the default configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies `CELLBENCH_*` environment variables on top of this configuration.
    ///
    /// Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(seed) = std::env::var("CELLBENCH_SEED") {
            if let Ok(seed) = seed.parse::<u64>() {
                self.simulation.seed = seed;
            }
        }

        if let Ok(max_events) = std::env::var("CELLBENCH_MAX_EVENTS") {
            if let Ok(count) = max_events.parse::<u64>() {
                self.simulation.max_events = count;
            }
        }

        if let Ok(technology) = std::env::var("CELLBENCH_TECHNOLOGY") {
            if let Ok(technology) = technology.parse::<RadioTechnology>() {
                self.radio.set_technology(technology);
            }
        }

        if let Ok(distance) = std::env::var("CELLBENCH_TERMINAL_DISTANCE_M") {
            if let Ok(metres) = distance.parse::<f64>() {
                self.radio.terminal_distance_m = metres;
            }
        }

        if let Ok(delay) = std::env::var("CELLBENCH_BACKHAUL_DELAY_MS") {
            if let Ok(millis) = delay.parse::<u64>() {
                self.topology.backhaul.propagation_delay = Duration::from_millis(millis);
            }
        }
    }

    /// Checks the configuration before anything is built.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - A link, flow, window, distance, or event bound is invalid
    pub fn validate(&self) -> Result<()> {
        self.topology.backhaul.validate("backhaul")?;
        self.topology.transport_link().validate("transport")?;
        self.traffic.flow.validate()?;

        if self.traffic.sink_stop < self.traffic.sink_start {
            return Err(HarnessError::configuration(format!(
                "sink stop {} precedes start {}",
                self.traffic.sink_stop, self.traffic.sink_start
            )));
        }
        if self.traffic.flow.stop > self.simulation.duration {
            return Err(HarnessError::configuration(format!(
                "generator stop {} is past the simulation end {}",
                self.traffic.flow.stop, self.simulation.duration
            )));
        }
        if !self.radio.terminal_distance_m.is_finite() || self.radio.terminal_distance_m < 0.0 {
            return Err(HarnessError::configuration(format!(
                "terminal distance must be a non-negative number of metres, got {}",
                self.radio.terminal_distance_m
            )));
        }
        if self.radio.max_bitrate_bps == Some(0) {
            return Err(HarnessError::configuration(
                "bearer maximum bit rate must be positive",
            ));
        }
        if self.simulation.max_events == 0 {
            return Err(HarnessError::configuration("max events must be positive"));
        }
        Ok(())
    }
}

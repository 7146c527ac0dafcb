//! Radio technologies, QoS classes, bearers, and device capabilities.
//!
//! `RadioTechnology` is a closed variant: it selects how terminals attach and
//! how bearers are established, but does not change any other component's
//! contract. Devices expose what they can do through the capability traits
//! [`Addressable`], [`Attachable`] and [`BearerCapable`].

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::topology::NodeId;
use crate::Result;

/// Radio generation used between the base station and the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum RadioTechnology {
    /// Legacy wide-area cellular (LTE-like)
    WideAreaCellular,
    /// High-bandwidth short-range band (mmWave-like)
    ShortRangeHighBand,
}

impl RadioTechnology {
    /// Both supported variants, legacy first.
    pub const ALL: [RadioTechnology; 2] = [
        RadioTechnology::WideAreaCellular,
        RadioTechnology::ShortRangeHighBand,
    ];

    /// Whether attachment may omit the target base station.
    pub fn supports_nearest_attach(self) -> bool {
        matches!(self, RadioTechnology::ShortRangeHighBand)
    }
}

impl fmt::Display for RadioTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioTechnology::WideAreaCellular => write!(f, "wide-area-cellular"),
            RadioTechnology::ShortRangeHighBand => write!(f, "short-range-high-band"),
        }
    }
}

impl FromStr for RadioTechnology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wide-area-cellular" | "wide-area" | "lte" | "4g" => {
                Ok(RadioTechnology::WideAreaCellular)
            }
            "short-range-high-band" | "short-range" | "mmwave" | "5g" => {
                Ok(RadioTechnology::ShortRangeHighBand)
            }
            _ => Err(format!("Invalid radio technology: {s}")),
        }
    }
}

/// 3D position in metres, consumed by the propagation model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in metres.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Whether a QoS class reserves a guaranteed bit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceType {
    Gbr,
    NonGbr,
}

/// Traffic treatment category assigned to a bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum QosClass {
    ConversationalVoice,
    ConversationalVideo,
    RealTimeGaming,
    BufferedVideo,
    ImsSignalling,
    VideoDefault,
}

impl QosClass {
    /// Standardized QoS class identifier.
    pub fn qci(self) -> u8 {
        match self {
            QosClass::ConversationalVoice => 1,
            QosClass::ConversationalVideo => 2,
            QosClass::RealTimeGaming => 3,
            QosClass::BufferedVideo => 4,
            QosClass::ImsSignalling => 5,
            QosClass::VideoDefault => 9,
        }
    }

    pub fn resource_type(self) -> ResourceType {
        match self {
            QosClass::ConversationalVoice
            | QosClass::ConversationalVideo
            | QosClass::RealTimeGaming
            | QosClass::BufferedVideo => ResourceType::Gbr,
            QosClass::ImsSignalling | QosClass::VideoDefault => ResourceType::NonGbr,
        }
    }

    /// Scheduling priority; lower is served first.
    pub fn priority(self) -> u8 {
        match self {
            QosClass::ImsSignalling => 1,
            QosClass::ConversationalVoice => 2,
            QosClass::RealTimeGaming => 3,
            QosClass::ConversationalVideo => 4,
            QosClass::BufferedVideo => 5,
            QosClass::VideoDefault => 9,
        }
    }

    pub fn packet_delay_budget(self) -> Duration {
        match self {
            QosClass::ConversationalVoice | QosClass::ImsSignalling => Duration::from_millis(100),
            QosClass::ConversationalVideo => Duration::from_millis(150),
            QosClass::RealTimeGaming => Duration::from_millis(50),
            QosClass::BufferedVideo | QosClass::VideoDefault => Duration::from_millis(300),
        }
    }
}

impl fmt::Display for QosClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QosClass::ConversationalVoice => "conversational-voice",
            QosClass::ConversationalVideo => "conversational-video",
            QosClass::RealTimeGaming => "real-time-gaming",
            QosClass::BufferedVideo => "buffered-video",
            QosClass::ImsSignalling => "ims-signalling",
            QosClass::VideoDefault => "video-default",
        };
        write!(f, "{name} (QCI {})", self.qci())
    }
}

/// Direction a traffic filter admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrafficDirection {
    Bidirectional,
    Uplink,
    Downlink,
}

/// Classifies which packets a bearer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficFilter {
    pub direction: TrafficDirection,
}

impl TrafficFilter {
    /// Open filter admitting traffic in both directions.
    pub fn bidirectional() -> Self {
        Self {
            direction: TrafficDirection::Bidirectional,
        }
    }

    pub fn admits_downlink(&self) -> bool {
        matches!(
            self.direction,
            TrafficDirection::Bidirectional | TrafficDirection::Downlink
        )
    }

    pub fn admits_uplink(&self) -> bool {
        matches!(
            self.direction,
            TrafficDirection::Bidirectional | TrafficDirection::Uplink
        )
    }
}

/// A QoS-classified logical flow between a terminal and the core network.
///
/// Never mutated after activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bearer {
    pub id: u8,
    pub terminal: NodeId,
    pub qos: QosClass,
    pub filter: TrafficFilter,
    /// Optional rate cap applied on top of the radio capacity
    pub max_bitrate_bps: Option<u64>,
    /// True for the bearer set up implicitly at attach time
    pub default_bearer: bool,
}

/// Something the address configurator can assign an IPv4 address to.
pub trait Addressable {
    fn node(&self) -> NodeId;

    fn address(&self) -> Option<Ipv4Addr>;

    fn assign_address(&mut self, address: Ipv4Addr);
}

/// Something that can attach to a base station.
///
/// Attachment replaces any previous serving base station, so an attachable
/// device is served by at most one base station at a time.
pub trait Attachable {
    fn position(&self) -> Position;

    fn serving_base_station(&self) -> Option<NodeId>;

    fn attach_to(&mut self, base_station: NodeId);
}

/// Something that can hold bearers.
pub trait BearerCapable {
    fn bearers(&self) -> &[Bearer];

    /// Installs a bearer on the device.
    ///
    /// # Errors
    ///
    /// - `HarnessError::BearerActivation` - The device cannot hold the bearer
    fn install_bearer(&mut self, bearer: Bearer) -> Result<()>;

    /// Returns the bearer that carries downlink traffic, preferring dedicated bearers.
    fn downlink_bearer(&self) -> Option<&Bearer> {
        self.bearers()
            .iter()
            .filter(|bearer| bearer.filter.admits_downlink())
            .min_by_key(|bearer| (bearer.default_bearer, bearer.qos.priority()))
    }
}

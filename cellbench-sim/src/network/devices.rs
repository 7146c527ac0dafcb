//! Radio devices installed on base station and terminal nodes.

use std::net::Ipv4Addr;

use cellbench_core::radio::{Addressable, Attachable, BearerCapable, Position};
use cellbench_core::{Bearer, HarnessError, NodeId, RadioTechnology, Result};

use super::radio_access::{RadioChannel, RadioProfile};

/// Bearers a single terminal may hold.
pub const MAX_BEARERS_PER_TERMINAL: usize = 11;

/// Radio device of a base station.
#[derive(Debug, Clone)]
pub struct BaseStationDevice {
    node: NodeId,
    position: Position,
    channel: RadioChannel,
}

impl BaseStationDevice {
    /// Creates a device running `profile` at `position`.
    pub fn new(node: NodeId, position: Position, profile: RadioProfile) -> Self {
        Self {
            node,
            position,
            channel: RadioChannel::new(profile),
        }
    }

    /// Node the device is installed on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Antenna position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Technology of the radio.
    pub fn technology(&self) -> RadioTechnology {
        self.channel.profile().technology
    }

    /// Whether a device at `position` is inside this cell.
    pub fn covers(&self, position: &Position) -> bool {
        self.channel
            .profile()
            .covers(self.position.distance_to(position))
    }

    /// Downlink channel of the cell.
    pub fn channel_mut(&mut self) -> &mut RadioChannel {
        &mut self.channel
    }
}

/// Radio device of a terminal.
#[derive(Debug, Clone)]
pub struct TerminalDevice {
    node: NodeId,
    imsi: u64,
    technology: RadioTechnology,
    position: Position,
    address: Option<Ipv4Addr>,
    serving: Option<NodeId>,
    bearers: Vec<Bearer>,
}

impl TerminalDevice {
    /// Creates a detached terminal with no address and no bearers.
    pub fn new(node: NodeId, imsi: u64, technology: RadioTechnology, position: Position) -> Self {
        Self {
            node,
            imsi,
            technology,
            position,
            address: None,
            serving: None,
            bearers: Vec::new(),
        }
    }

    /// Subscriber identity used by the core anchor to key sessions.
    pub fn imsi(&self) -> u64 {
        self.imsi
    }

    /// Technology of the radio.
    pub fn technology(&self) -> RadioTechnology {
        self.technology
    }

    /// Identifier for the next bearer installed on this terminal.
    pub fn next_bearer_id(&self) -> u8 {
        self.bearers.len() as u8 + 1
    }
}

impl Addressable for TerminalDevice {
    fn node(&self) -> NodeId {
        self.node
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    fn assign_address(&mut self, address: Ipv4Addr) {
        self.address = Some(address);
    }
}

impl Attachable for TerminalDevice {
    fn position(&self) -> Position {
        self.position
    }

    fn serving_base_station(&self) -> Option<NodeId> {
        self.serving
    }

    fn attach_to(&mut self, base_station: NodeId) {
        self.serving = Some(base_station);
    }
}

impl BearerCapable for TerminalDevice {
    fn bearers(&self) -> &[Bearer] {
        &self.bearers
    }

    fn install_bearer(&mut self, bearer: Bearer) -> Result<()> {
        if self.serving.is_none() {
            return Err(HarnessError::bearer_activation(format!(
                "terminal {} is not attached",
                self.node
            )));
        }
        if bearer.terminal != self.node {
            return Err(HarnessError::bearer_activation(format!(
                "bearer {} belongs to {}, not {}",
                bearer.id, bearer.terminal, self.node
            )));
        }
        if self.bearers.len() >= MAX_BEARERS_PER_TERMINAL {
            return Err(HarnessError::bearer_activation(format!(
                "terminal {} already holds {} bearers",
                self.node, MAX_BEARERS_PER_TERMINAL
            )));
        }
        self.bearers.push(bearer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cellbench_core::radio::TrafficFilter;
    use cellbench_core::QosClass;

    use super::*;

    fn terminal() -> TerminalDevice {
        TerminalDevice::new(
            NodeId::new(2),
            1,
            RadioTechnology::WideAreaCellular,
            Position::new(10.0, 0.0, 1.5),
        )
    }

    fn bearer(id: u8, default_bearer: bool, qos: QosClass) -> Bearer {
        Bearer {
            id,
            terminal: NodeId::new(2),
            qos,
            filter: TrafficFilter::bidirectional(),
            max_bitrate_bps: None,
            default_bearer,
        }
    }

    #[test]
    fn test_bearer_requires_attachment() {
        let mut device = terminal();
        let result = device.install_bearer(bearer(1, true, QosClass::VideoDefault));
        assert!(matches!(result, Err(HarnessError::BearerActivation { .. })));

        device.attach_to(NodeId::new(1));
        assert!(
            device
                .install_bearer(bearer(1, true, QosClass::VideoDefault))
                .is_ok()
        );
        assert_eq!(device.next_bearer_id(), 2);
    }

    #[test]
    fn test_dedicated_bearer_carries_downlink() {
        let mut device = terminal();
        device.attach_to(NodeId::new(1));
        device
            .install_bearer(bearer(1, true, QosClass::VideoDefault))
            .unwrap();
        device
            .install_bearer(bearer(2, false, QosClass::ConversationalVoice))
            .unwrap();

        assert_eq!(device.downlink_bearer().map(|b| b.id), Some(2));
    }

    #[test]
    fn test_reattach_replaces_serving_cell() {
        let mut device = terminal();
        device.attach_to(NodeId::new(1));
        device.attach_to(NodeId::new(5));
        assert_eq!(device.serving_base_station(), Some(NodeId::new(5)));
    }

    #[test]
    fn test_base_station_coverage() {
        let profile = RadioProfile::for_technology(RadioTechnology::ShortRangeHighBand);
        let cell = BaseStationDevice::new(NodeId::new(1), Position::new(0.0, 0.0, 10.0), profile);

        assert!(cell.covers(&Position::new(5.0, 0.0, 1.5)));
        assert!(!cell.covers(&Position::new(500.0, 0.0, 1.5)));
        assert_eq!(cell.technology(), RadioTechnology::ShortRangeHighBand);
    }
}

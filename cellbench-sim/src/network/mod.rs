//! In-process radio network simulator.
//!
//! Owns every radio device, the wired segments, the address plan, and the
//! per-node routing tables. The harness drives it through configuration calls
//! (device installation, attach, bearer activation, addressing, routes) and
//! through three forwarding steps that move a downlink datagram from the
//! backhaul peer to the terminal.

mod devices;
mod point_to_point;
mod radio_access;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use cellbench_core::addressing::{AddressAllocator, InterfaceIndex};
use cellbench_core::metrics::DropReason;
use cellbench_core::radio::{
    Addressable, Attachable, BearerCapable, Position, QosClass, TrafficFilter,
};
use cellbench_core::{
    AddressMap, Bearer, HarnessError, Ipv4Subnet, LinkParams, NodeId, Packet, RadioTechnology,
    Result, RoutingTable, SimTime,
};

pub use devices::{BaseStationDevice, MAX_BEARERS_PER_TERMINAL, TerminalDevice};
pub use point_to_point::PointToPointChannel;
pub use radio_access::{RadioChannel, RadioLinkState, RadioProfile};

use crate::deterministic::DeterministicRng;

/// Interface of a wired device, on either end of the link.
pub const WIRED_INTERFACE: InterfaceIndex = 1;

/// Core anchor interface facing the terminals' address pool.
pub const ANCHOR_TERMINAL_INTERFACE: InterfaceIndex = 2;

/// Terminal radio interface.
pub const TERMINAL_INTERFACE: InterfaceIndex = 1;

/// First subscriber identity handed out.
const FIRST_IMSI: u64 = 1;

/// A packet in flight with its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    /// Packet with its metadata
    pub packet: Packet,
    /// Terminal address
    pub destination: Ipv4Addr,
    /// Destination port
    pub port: u16,
}

/// Wired segment of the data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiredSegment {
    /// Backhaul peer to core anchor
    Backhaul,
    /// Core anchor to base station
    Transport,
}

/// The simulated radio network.
#[derive(Debug)]
pub struct RadioNetwork {
    profile: RadioProfile,
    core_anchor: NodeId,
    base_stations: BTreeMap<NodeId, BaseStationDevice>,
    terminals: BTreeMap<NodeId, TerminalDevice>,
    next_imsi: u64,
    backhaul: Option<PointToPointChannel>,
    transport: Option<PointToPointChannel>,
    addresses: AddressMap,
    routes: BTreeMap<NodeId, RoutingTable>,
    terminal_pool: AddressAllocator,
    rng: DeterministicRng,
}

impl RadioNetwork {
    /// Creates a network whose core anchor serves `terminal_pool`.
    ///
    /// The anchor takes the pool's first host as gateway address and routes
    /// the pool towards its terminal-facing interface.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - The pool cannot hold a gateway and a terminal
    pub fn new(
        technology: RadioTechnology,
        core_anchor: NodeId,
        terminal_pool: Ipv4Subnet,
        seed: u64,
    ) -> Result<Self> {
        let mut pool = AddressAllocator::new(terminal_pool);
        let gateway = pool.allocate()?;

        let mut addresses = AddressMap::new();
        addresses.insert(core_anchor, ANCHOR_TERMINAL_INTERFACE, gateway);

        let mut anchor_routes = RoutingTable::new();
        anchor_routes.add_network_route(terminal_pool, ANCHOR_TERMINAL_INTERFACE)?;
        let mut routes = BTreeMap::new();
        routes.insert(core_anchor, anchor_routes);

        tracing::debug!(%technology, %terminal_pool, %gateway, "Radio network created");

        Ok(Self {
            profile: RadioProfile::for_technology(technology),
            core_anchor,
            base_stations: BTreeMap::new(),
            terminals: BTreeMap::new(),
            next_imsi: FIRST_IMSI,
            backhaul: None,
            transport: None,
            addresses,
            routes,
            terminal_pool: pool,
            rng: DeterministicRng::from_seed(seed),
        })
    }

    /// Technology every radio device of this network runs.
    pub fn technology(&self) -> RadioTechnology {
        self.profile.technology
    }

    /// Radio constants of this network.
    pub fn profile(&self) -> &RadioProfile {
        &self.profile
    }

    /// Core anchor node.
    pub fn core_anchor(&self) -> NodeId {
        self.core_anchor
    }

    /// Installs a wired segment.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Parameters are invalid or the segment already exists
    pub fn install_link(&mut self, segment: WiredSegment, params: LinkParams) -> Result<()> {
        let (slot, label, drop_reason) = match segment {
            WiredSegment::Backhaul => (&mut self.backhaul, "backhaul", DropReason::BackhaulQueue),
            WiredSegment::Transport => {
                (&mut self.transport, "transport", DropReason::TransportQueue)
            }
        };
        params.validate(label)?;
        if slot.is_some() {
            return Err(HarnessError::configuration(format!(
                "{label} link is already installed"
            )));
        }
        *slot = Some(PointToPointChannel::new(params, drop_reason));
        tracing::debug!(
            bandwidth_bps = params.bandwidth_bps,
            delay = ?params.propagation_delay,
            "Installed {label} link"
        );
        Ok(())
    }

    /// Installs a base station device on `node`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - The node already carries a radio device
    pub fn install_base_station_device(&mut self, node: NodeId, position: Position) -> Result<()> {
        self.ensure_no_device(node)?;
        self.base_stations
            .insert(node, BaseStationDevice::new(node, position, self.profile));
        Ok(())
    }

    /// Installs a terminal device on `node` and returns its IMSI.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - The node already carries a radio device
    pub fn install_terminal_device(&mut self, node: NodeId, position: Position) -> Result<u64> {
        self.ensure_no_device(node)?;
        let imsi = self.next_imsi;
        self.next_imsi += 1;
        self.terminals.insert(
            node,
            TerminalDevice::new(node, imsi, self.profile.technology, position),
        );
        Ok(imsi)
    }

    fn ensure_no_device(&self, node: NodeId) -> Result<()> {
        if self.base_stations.contains_key(&node) || self.terminals.contains_key(&node) {
            return Err(HarnessError::configuration(format!(
                "{node} already has a radio device"
            )));
        }
        Ok(())
    }

    /// Terminal device on `node`.
    pub fn terminal(&self, node: NodeId) -> Option<&TerminalDevice> {
        self.terminals.get(&node)
    }

    /// Base station device on `node`.
    pub fn base_station(&self, node: NodeId) -> Option<&BaseStationDevice> {
        self.base_stations.get(&node)
    }

    fn terminal_mut(&mut self, node: NodeId) -> Result<&mut TerminalDevice> {
        self.terminals
            .get_mut(&node)
            .ok_or_else(|| HarnessError::configuration(format!("{node} has no terminal device")))
    }

    /// Attaches `terminal` to `base_station`, replacing any previous attachment.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Attachment` - Unknown base station, technology mismatch, or out of coverage
    /// - `HarnessError::Configuration` - `terminal` has no terminal device
    pub fn attach(&mut self, terminal: NodeId, base_station: NodeId) -> Result<()> {
        let cell = self.base_stations.get(&base_station).ok_or_else(|| {
            HarnessError::attachment(format!("{base_station} has no base station device"))
        })?;
        let cell_position = cell.position();
        let cell_technology = cell.technology();

        let device = self.terminal_mut(terminal)?;
        let terminal_technology = device.technology();
        let distance = cell_position.distance_to(&device.position());
        if terminal_technology != cell_technology {
            return Err(HarnessError::attachment(format!(
                "{terminal} runs {terminal_technology} but {base_station} runs {cell_technology}"
            )));
        }
        if !self.profile.covers(distance) {
            return Err(HarnessError::attachment(format!(
                "{terminal} is {distance:.1} m from {base_station}, beyond the {:.0} m coverage radius",
                self.profile.coverage_radius_m
            )));
        }

        let device = self.terminal_mut(terminal)?;
        device.attach_to(base_station);
        tracing::debug!(%terminal, %base_station, distance_m = distance, "Terminal attached");
        Ok(())
    }

    /// Closest base station of the same technology that covers `terminal`.
    pub fn nearest_base_station(&self, terminal: NodeId) -> Option<NodeId> {
        let device = self.terminals.get(&terminal)?;
        let position = device.position();
        self.base_stations
            .values()
            .filter(|cell| cell.technology() == device.technology() && cell.covers(&position))
            .min_by(|a, b| {
                a.position()
                    .distance_to(&position)
                    .total_cmp(&b.position().distance_to(&position))
            })
            .map(BaseStationDevice::node)
    }

    /// Allocates the terminal's address from the anchor pool unless it already has one.
    fn ensure_terminal_address(&mut self, terminal: NodeId) -> Result<Ipv4Addr> {
        if let Some(address) = self.terminal_mut(terminal)?.address() {
            return Ok(address);
        }
        let address = self.terminal_pool.allocate()?;
        self.terminal_mut(terminal)?.assign_address(address);
        self.addresses.insert(terminal, TERMINAL_INTERFACE, address);
        tracing::debug!(%terminal, %address, "Terminal address allocated");
        Ok(address)
    }

    fn install_bearer(
        &mut self,
        terminal: NodeId,
        qos: QosClass,
        filter: TrafficFilter,
        max_bitrate_bps: Option<u64>,
        default_bearer: bool,
    ) -> Result<Bearer> {
        let device = self.terminal_mut(terminal)?;
        let bearer = Bearer {
            id: device.next_bearer_id(),
            terminal,
            qos,
            filter,
            max_bitrate_bps,
            default_bearer,
        };
        device.install_bearer(bearer.clone())?;
        tracing::debug!(%terminal, bearer = bearer.id, %qos, default_bearer, "Bearer installed");
        Ok(bearer)
    }

    /// Sets up the attach-time session of a wide-area terminal: its address
    /// and a default best-effort bearer.
    ///
    /// # Errors
    ///
    /// - `HarnessError::BearerActivation` - The terminal is not attached
    /// - `HarnessError::Configuration` - Address pool exhausted
    pub fn setup_default_session(&mut self, terminal: NodeId) -> Result<Bearer> {
        if self.terminal_mut(terminal)?.serving_base_station().is_none() {
            return Err(HarnessError::bearer_activation(format!(
                "{terminal} must attach before a session is set up"
            )));
        }
        self.ensure_terminal_address(terminal)?;
        self.install_bearer(
            terminal,
            QosClass::VideoDefault,
            TrafficFilter::bidirectional(),
            None,
            true,
        )
    }

    /// Adds a dedicated bearer to an attached terminal.
    ///
    /// # Errors
    ///
    /// - `HarnessError::BearerActivation` - The terminal is not attached or holds too many bearers
    pub fn activate_dedicated_bearer(
        &mut self,
        terminal: NodeId,
        qos: QosClass,
        filter: TrafficFilter,
        max_bitrate_bps: Option<u64>,
    ) -> Result<Bearer> {
        self.install_bearer(terminal, qos, filter, max_bitrate_bps, false)
    }

    /// Activates a bearer through the core anchor, keyed by subscriber
    /// identity. The anchor allocates the terminal's address on the first
    /// activation.
    ///
    /// # Errors
    ///
    /// - `HarnessError::BearerActivation` - Unknown IMSI, or the terminal is not attached
    /// - `HarnessError::Configuration` - Address pool exhausted
    pub fn activate_bearer_by_imsi(
        &mut self,
        imsi: u64,
        qos: QosClass,
        filter: TrafficFilter,
        max_bitrate_bps: Option<u64>,
    ) -> Result<Bearer> {
        let device = self
            .terminals
            .values()
            .find(|device| device.imsi() == imsi)
            .ok_or_else(|| HarnessError::bearer_activation(format!("unknown IMSI {imsi}")))?;
        let terminal = device.node();
        if device.serving_base_station().is_none() {
            return Err(HarnessError::bearer_activation(format!(
                "{terminal} (IMSI {imsi}) is not attached"
            )));
        }
        let default_bearer = device.bearers().is_empty();

        self.ensure_terminal_address(terminal)?;
        self.install_bearer(terminal, qos, filter, max_bitrate_bps, default_bearer)
    }

    /// Assigns sequential addresses from `subnet` to the given interfaces and
    /// installs the connected route on each node.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Subnet exhausted or overlapping an existing route
    pub fn assign_ipv4(
        &mut self,
        subnet: Ipv4Subnet,
        interfaces: &[(NodeId, InterfaceIndex)],
    ) -> Result<Vec<Ipv4Addr>> {
        let mut allocator = AddressAllocator::new(subnet);
        let mut assigned = Vec::with_capacity(interfaces.len());
        for (node, interface) in interfaces {
            let address = allocator.allocate()?;
            self.add_static_route(*node, subnet, *interface)?;
            self.addresses.insert(*node, *interface, address);
            assigned.push(address);
        }
        Ok(assigned)
    }

    /// Installs a network route on `node`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Destination overlaps an existing route on that node
    pub fn add_static_route(
        &mut self,
        node: NodeId,
        destination: Ipv4Subnet,
        interface: InterfaceIndex,
    ) -> Result<()> {
        self.routes
            .entry(node)
            .or_default()
            .add_network_route(destination, interface)
    }

    /// Addresses assigned so far.
    pub fn addresses(&self) -> &AddressMap {
        &self.addresses
    }

    /// Routing table of `node`.
    pub fn routing_table(&self, node: NodeId) -> Option<&RoutingTable> {
        self.routes.get(&node)
    }

    /// Sends a datagram from `source` over the backhaul and returns its arrival
    /// time at the core anchor.
    ///
    /// # Errors
    ///
    /// - `DropReason::NoRoute` - `source` has no route to the destination
    /// - `DropReason::BackhaulQueue` - Backhaul queue is full
    pub fn send_from(
        &mut self,
        now: SimTime,
        source: NodeId,
        datagram: &mut Datagram,
    ) -> std::result::Result<SimTime, DropReason> {
        let interface = self
            .routes
            .get(&source)
            .and_then(|table| table.lookup(datagram.destination))
            .ok_or(DropReason::NoRoute)?;
        if interface != WIRED_INTERFACE {
            return Err(DropReason::NoRoute);
        }
        let backhaul = self.backhaul.as_mut().ok_or(DropReason::NoRoute)?;
        backhaul.transmit(now, &mut datagram.packet)
    }

    fn downlink_target(
        &self,
        destination: Ipv4Addr,
    ) -> std::result::Result<&TerminalDevice, DropReason> {
        let terminal = self
            .addresses
            .owner_of(destination)
            .and_then(|node| self.terminals.get(&node))
            .ok_or(DropReason::NoRoute)?;
        if terminal.serving_base_station().is_none() {
            return Err(DropReason::NoRoute);
        }
        Ok(terminal)
    }

    /// Forwards a datagram from the core anchor over the transport segment and
    /// returns its arrival time at the serving base station.
    ///
    /// # Errors
    ///
    /// - `DropReason::NoRoute` - Destination is not an attached terminal of the pool
    /// - `DropReason::NoBearer` - Terminal has no bearer admitting downlink traffic
    /// - `DropReason::TransportQueue` - Transport queue is full
    pub fn forward_at_anchor(
        &mut self,
        now: SimTime,
        datagram: &mut Datagram,
    ) -> std::result::Result<SimTime, DropReason> {
        let interface = self
            .routes
            .get(&self.core_anchor)
            .and_then(|table| table.lookup(datagram.destination))
            .ok_or(DropReason::NoRoute)?;
        if interface != ANCHOR_TERMINAL_INTERFACE {
            return Err(DropReason::NoRoute);
        }
        let terminal = self.downlink_target(datagram.destination)?;
        if terminal.downlink_bearer().is_none() {
            return Err(DropReason::NoBearer);
        }
        let transport = self.transport.as_mut().ok_or(DropReason::NoRoute)?;
        transport.transmit(now, &mut datagram.packet)
    }

    /// Schedules a datagram on the serving cell's downlink and returns the
    /// time the terminal decodes it.
    ///
    /// # Errors
    ///
    /// - `DropReason::NoRoute` - Destination is not an attached terminal
    /// - `DropReason::NoBearer` - Terminal has no bearer admitting downlink traffic
    /// - `DropReason::RadioQueue` - The cell could not serve the packet in time
    /// - `DropReason::HarqExhausted` - Every transmission attempt failed
    pub fn transmit_radio(
        &mut self,
        now: SimTime,
        datagram: &Datagram,
    ) -> std::result::Result<SimTime, DropReason> {
        let terminal = self.downlink_target(datagram.destination)?;
        let bearer = terminal.downlink_bearer().ok_or(DropReason::NoBearer)?;
        let max_bitrate_bps = bearer.max_bitrate_bps;
        let position = terminal.position();
        let serving = terminal
            .serving_base_station()
            .ok_or(DropReason::NoRoute)?;

        let cell = self
            .base_stations
            .get_mut(&serving)
            .ok_or(DropReason::NoRoute)?;
        let link = RadioLinkState {
            distance_m: cell.position().distance_to(&position),
            max_bitrate_bps,
        };
        cell.channel_mut()
            .transmit(now, datagram.packet.size(), link, &mut self.rng)
    }
}

//! IPv4 subnets, address allocation, and static routing tables.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::topology::NodeId;
use crate::{HarnessError, Result};

/// Interface index on a node. Index 0 is loopback, wired and radio devices start at 1.
pub type InterfaceIndex = u32;

/// Address pool the core anchor hands terminals from.
pub const TERMINAL_POOL: Ipv4Subnet = Ipv4Subnet {
    network: Ipv4Addr::new(7, 0, 0, 0),
    prefix_len: 8,
};

/// Backhaul subnet of the wide-area presets.
pub const WIDE_AREA_BACKHAUL_SUBNET: Ipv4Subnet = Ipv4Subnet {
    network: Ipv4Addr::new(1, 0, 0, 0),
    prefix_len: 24,
};

/// Backhaul subnet of the short-range presets.
pub const SHORT_RANGE_BACKHAUL_SUBNET: Ipv4Subnet = Ipv4Subnet {
    network: Ipv4Addr::new(1, 0, 0, 0),
    prefix_len: 8,
};

/// An IPv4 network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Subnet {
    /// Creates a subnet, masking off host bits of `network`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Prefix length is greater than 32
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(HarnessError::configuration(format!(
                "Invalid prefix length /{prefix_len}"
            )));
        }
        let masked = u32::from(network) & Self::mask_bits(prefix_len);
        Ok(Self {
            network: Ipv4Addr::from(masked),
            prefix_len,
        })
    }

    fn mask_bits(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len as u32)
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_bits(self.prefix_len))
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & Self::mask_bits(self.prefix_len) == u32::from(self.network)
    }

    /// Two prefixes overlap when one contains the other's network address.
    pub fn overlaps(&self, other: &Ipv4Subnet) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }

    /// Number of usable host addresses.
    pub fn host_capacity(&self) -> u64 {
        match self.prefix_len {
            32 => 1,
            31 => 2,
            len => (1u64 << (32 - len as u32)) - 2,
        }
    }

    /// Returns the `index`-th host address (1-based), if it fits in the subnet.
    pub fn host(&self, index: u32) -> Option<Ipv4Addr> {
        if index == 0 || index as u64 > self.host_capacity() {
            return None;
        }
        // /31 and /32 have no network or broadcast address to skip
        let offset = if self.prefix_len >= 31 { index - 1 } else { index };
        u32::from(self.network).checked_add(offset).map(Ipv4Addr::from)
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let (network, prefix) = s
            .split_once('/')
            .ok_or_else(|| HarnessError::configuration(format!("Invalid subnet: {s}")))?;
        let network: Ipv4Addr = network
            .parse()
            .map_err(|_| HarnessError::configuration(format!("Invalid subnet address: {s}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| HarnessError::configuration(format!("Invalid subnet prefix: {s}")))?;
        Ipv4Subnet::new(network, prefix_len)
    }
}

/// Hands out sequential host addresses from a subnet.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    subnet: Ipv4Subnet,
    next_host: u32,
}

impl AddressAllocator {
    pub fn new(subnet: Ipv4Subnet) -> Self {
        Self {
            subnet,
            next_host: 1,
        }
    }

    pub fn subnet(&self) -> Ipv4Subnet {
        self.subnet
    }

    /// Allocates the next free address.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Subnet is exhausted
    pub fn allocate(&mut self) -> Result<Ipv4Addr> {
        let address = self.subnet.host(self.next_host).ok_or_else(|| {
            HarnessError::configuration(format!("Address pool {} exhausted", self.subnet))
        })?;
        self.next_host += 1;
        Ok(address)
    }
}

/// Addresses assigned to every node interface.
#[derive(Debug, Clone, Default)]
pub struct AddressMap {
    entries: BTreeMap<(NodeId, InterfaceIndex), Ipv4Addr>,
}

/// One serialized row of an [`AddressMap`].
#[derive(Serialize)]
struct AddressEntry {
    node: NodeId,
    interface: InterfaceIndex,
    address: Ipv4Addr,
}

// Tuple keys are not valid JSON object keys, so the map serializes as a list
impl Serialize for AddressMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|(node, interface, address)| AddressEntry {
            node,
            interface,
            address,
        }))
    }
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeId, interface: InterfaceIndex, address: Ipv4Addr) {
        self.entries.insert((node, interface), address);
    }

    pub fn get(&self, node: NodeId, interface: InterfaceIndex) -> Option<Ipv4Addr> {
        self.entries.get(&(node, interface)).copied()
    }

    /// First address assigned to `node`, in interface order.
    pub fn primary(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|((owner, _), _)| *owner == node)
            .map(|(_, address)| *address)
    }

    /// Node owning `address`, if any.
    pub fn owner_of(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.entries
            .iter()
            .find(|(_, assigned)| **assigned == address)
            .map(|((node, _), _)| *node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, InterfaceIndex, Ipv4Addr)> + '_ {
        self.entries
            .iter()
            .map(|((node, interface), address)| (*node, *interface, *address))
    }
}

/// Static network route towards a destination prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StaticRoute {
    pub destination: Ipv4Subnet,
    pub interface: InterfaceIndex,
}

/// Per-node static routing table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingTable {
    routes: Vec<StaticRoute>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network route.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Destination overlaps an existing route
    pub fn add_network_route(
        &mut self,
        destination: Ipv4Subnet,
        interface: InterfaceIndex,
    ) -> Result<()> {
        if let Some(existing) = self
            .routes
            .iter()
            .find(|route| route.destination.overlaps(&destination))
        {
            return Err(HarnessError::configuration(format!(
                "Route to {destination} overlaps existing route to {} via interface {}",
                existing.destination, existing.interface
            )));
        }
        self.routes.push(StaticRoute {
            destination,
            interface,
        });
        Ok(())
    }

    /// Longest-prefix match for `address`.
    pub fn lookup(&self, address: Ipv4Addr) -> Option<InterfaceIndex> {
        self.routes
            .iter()
            .filter(|route| route.destination.contains(address))
            .max_by_key(|route| route.destination.prefix_len())
            .map(|route| route.interface)
    }

    pub fn routes(&self) -> &[StaticRoute] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Ipv4Subnet {
        s.parse().unwrap()
    }

    #[test]
    fn test_subnet_parsing_masks_host_bits() {
        let parsed = subnet("7.1.2.3/8");
        assert_eq!(parsed.network(), Ipv4Addr::new(7, 0, 0, 0));
        assert_eq!(parsed.mask(), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(parsed.to_string(), "7.0.0.0/8");

        assert!("7.0.0.0".parse::<Ipv4Subnet>().is_err());
        assert!("7.0.0.0/33".parse::<Ipv4Subnet>().is_err());
    }

    #[test]
    fn test_subnet_overlap() {
        assert!(subnet("7.0.0.0/8").overlaps(&subnet("7.0.0.0/16")));
        assert!(subnet("7.5.0.0/16").overlaps(&subnet("7.0.0.0/8")));
        assert!(!subnet("1.0.0.0/24").overlaps(&subnet("7.0.0.0/8")));
    }

    #[test]
    fn test_allocator_hands_out_sequential_hosts() {
        let mut allocator = AddressAllocator::new(subnet("1.0.0.0/24"));
        assert_eq!(allocator.allocate().unwrap(), Ipv4Addr::new(1, 0, 0, 1));
        assert_eq!(allocator.allocate().unwrap(), Ipv4Addr::new(1, 0, 0, 2));
    }

    #[test]
    fn test_point_to_point_and_host_subnets() {
        let host = subnet("10.0.0.5/32");
        assert_eq!(host.host(1), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(host.host(2), None);

        let pair = subnet("10.0.0.4/31");
        assert_eq!(pair.host(1), Some(Ipv4Addr::new(10, 0, 0, 4)));
        assert_eq!(pair.host(2), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(pair.host(3), None);

        let last = subnet("255.255.255.255/32");
        assert_eq!(last.host(1), Some(Ipv4Addr::BROADCAST));
        assert_eq!(last.host(2), None);

        let mut allocator = AddressAllocator::new(pair);
        assert_eq!(allocator.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(allocator.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 5));
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut allocator = AddressAllocator::new(subnet("10.0.0.0/30"));
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();
        assert!(matches!(
            allocator.allocate(),
            Err(HarnessError::Configuration { .. })
        ));
    }

    #[test]
    fn test_overlapping_route_is_rejected() {
        let mut table = RoutingTable::new();
        table.add_network_route(subnet("7.0.0.0/8"), 1).unwrap();

        let result = table.add_network_route(subnet("7.3.0.0/16"), 2);
        assert!(matches!(result, Err(HarnessError::Configuration { .. })));
        assert_eq!(table.routes().len(), 1);
    }

    #[test]
    fn test_route_lookup() {
        let mut table = RoutingTable::new();
        table.add_network_route(subnet("7.0.0.0/8"), 1).unwrap();
        table.add_network_route(subnet("1.0.0.0/24"), 2).unwrap();

        assert_eq!(table.lookup(Ipv4Addr::new(7, 0, 0, 2)), Some(1));
        assert_eq!(table.lookup(Ipv4Addr::new(1, 0, 0, 9)), Some(2));
        assert_eq!(table.lookup(Ipv4Addr::new(8, 8, 8, 8)), None);
    }

    #[test]
    fn test_address_map_lookups() {
        let mut map = AddressMap::new();
        map.insert(NodeId::new(3), 1, Ipv4Addr::new(1, 0, 0, 2));
        map.insert(NodeId::new(2), 1, Ipv4Addr::new(7, 0, 0, 2));

        assert_eq!(map.primary(NodeId::new(2)), Some(Ipv4Addr::new(7, 0, 0, 2)));
        assert_eq!(map.owner_of(Ipv4Addr::new(1, 0, 0, 2)), Some(NodeId::new(3)));
        assert_eq!(map.len(), 2);
    }
}

//! Topology builder: node set and wired backhaul link.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::{HarnessError, Result};

/// Default drop-tail queue depth of a wired segment, in packets.
pub const DEFAULT_QUEUE_PACKETS: usize = 100;

/// Opaque node identifier, unique within one topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Role a node plays in the data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeRole {
    /// Packet gateway bridging the radio access network to the backhaul
    CoreAnchor,
    /// Radio access point
    BaseStation,
    /// Mobile end device
    Terminal,
    /// External traffic peer on the far side of the backhaul
    BackhaulPeer,
}

impl NodeRole {
    fn default_name(self) -> &'static str {
        match self {
            NodeRole::CoreAnchor => "core-anchor",
            NodeRole::BaseStation => "base-station-0",
            NodeRole::Terminal => "terminal-0",
            NodeRole::BackhaulPeer => "backhaul-peer",
        }
    }
}

/// A simulated node. Immutable once the topology is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    id: NodeId,
    role: NodeRole,
    name: String,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Attributes of a wired point-to-point segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkParams {
    /// Line rate in bits per second
    pub bandwidth_bps: u64,
    /// One-way propagation delay
    pub propagation_delay: Duration,
    /// Drop-tail queue depth in packets
    pub queue_packets: usize,
    /// Whether packet metadata survives the hop
    pub propagates_metadata: bool,
}

impl LinkParams {
    /// Creates link parameters with the default queue depth and metadata propagation.
    pub fn new(bandwidth_bps: u64, propagation_delay: Duration) -> Self {
        Self {
            bandwidth_bps,
            propagation_delay,
            queue_packets: DEFAULT_QUEUE_PACKETS,
            propagates_metadata: true,
        }
    }

    /// Rejects non-positive bandwidth, delay, or queue depth.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - A parameter is zero
    pub fn validate(&self, label: &str) -> Result<()> {
        if self.bandwidth_bps == 0 {
            return Err(HarnessError::configuration(format!(
                "{label} bandwidth must be positive"
            )));
        }
        if self.propagation_delay.is_zero() {
            return Err(HarnessError::configuration(format!(
                "{label} propagation delay must be positive"
            )));
        }
        if self.queue_packets == 0 {
            return Err(HarnessError::configuration(format!(
                "{label} queue must hold at least one packet"
            )));
        }
        Ok(())
    }

    /// Time to clock `bytes` onto the wire.
    pub fn serialization_delay(&self, bytes: u32) -> Duration {
        let nanos = (bytes as u128 * 8 * 1_000_000_000) / self.bandwidth_bps.max(1) as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// An edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub endpoints: (NodeId, NodeId),
    pub params: LinkParams,
}

/// Fully wired node set with no addressing yet.
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    nodes: Vec<Node>,
    backhaul: Link,
}

impl Topology {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Wired link between the backhaul peer and the core anchor.
    pub fn backhaul(&self) -> &Link {
        &self.backhaul
    }

    /// Returns the first node with the given role.
    ///
    /// Every role is present in a built topology.
    pub fn node(&self, role: NodeRole) -> &Node {
        self.nodes
            .iter()
            .find(|node| node.role == role)
            .unwrap_or(&self.nodes[0])
    }

    pub fn core_anchor(&self) -> NodeId {
        self.node(NodeRole::CoreAnchor).id
    }

    pub fn base_station(&self) -> NodeId {
        self.node(NodeRole::BaseStation).id
    }

    pub fn terminal(&self) -> NodeId {
        self.node(NodeRole::Terminal).id
    }

    pub fn backhaul_peer(&self) -> NodeId {
        self.node(NodeRole::BackhaulPeer).id
    }

    /// Looks up a node by identifier.
    pub fn find(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Creates the core anchor, base station, terminal, and backhaul peer and
/// wires the backhaul link between the peer and the anchor.
///
/// # Errors
///
/// - `HarnessError::Configuration` - Link parameters are not positive
pub fn build_topology(backhaul: LinkParams) -> Result<Topology> {
    backhaul.validate("backhaul")?;

    let roles = [
        NodeRole::CoreAnchor,
        NodeRole::BaseStation,
        NodeRole::Terminal,
        NodeRole::BackhaulPeer,
    ];
    let nodes: Vec<Node> = roles
        .iter()
        .enumerate()
        .map(|(index, role)| Node {
            id: NodeId::new(index as u32),
            role: *role,
            name: role.default_name().to_string(),
        })
        .collect();

    let link = Link {
        endpoints: (NodeId::new(3), NodeId::new(0)),
        params: backhaul,
    };

    tracing::debug!(
        bandwidth_bps = backhaul.bandwidth_bps,
        delay = ?backhaul.propagation_delay,
        "Built topology with {} nodes",
        nodes.len()
    );

    Ok(Topology {
        nodes,
        backhaul: link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_topology_creates_every_role() {
        let topology =
            build_topology(LinkParams::new(1_000_000_000, Duration::from_millis(30))).unwrap();

        assert_eq!(topology.nodes().len(), 4);
        assert_eq!(topology.node(NodeRole::Terminal).name(), "terminal-0");
        assert_eq!(
            topology.backhaul().endpoints,
            (topology.backhaul_peer(), topology.core_anchor())
        );
    }

    #[test]
    fn test_non_positive_link_parameters_are_rejected() {
        let zero_bandwidth = build_topology(LinkParams::new(0, Duration::from_millis(1)));
        assert!(matches!(
            zero_bandwidth,
            Err(HarnessError::Configuration { .. })
        ));

        let zero_delay = build_topology(LinkParams::new(1_000, Duration::ZERO));
        assert!(matches!(zero_delay, Err(HarnessError::Configuration { .. })));
    }

    #[test]
    fn test_serialization_delay() {
        let gigabit = LinkParams::new(1_000_000_000, Duration::from_millis(1));
        assert_eq!(gigabit.serialization_delay(1500), Duration::from_nanos(12_000));

        let ten_gigabit = LinkParams::new(10_000_000_000, Duration::from_millis(1));
        assert_eq!(ten_gigabit.serialization_delay(1500), Duration::from_nanos(1_200));
    }
}

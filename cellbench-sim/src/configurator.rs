//! Address and static route configuration.
//!
//! Runs after bearer activation, since the short-range terminal only learns
//! its address when the core anchor activates its bearer.

use cellbench_core::addressing::InterfaceIndex;
use cellbench_core::radio::Addressable;
use cellbench_core::{AddressMap, HarnessError, Ipv4Subnet, NodeId, Result, Topology};

use crate::network::{RadioNetwork, WIRED_INTERFACE};

/// Assigns the backhaul addresses and returns every address in the network.
///
/// The core anchor takes the first host of `backhaul_subnet` and the backhaul
/// peer the second, both on their wired interface.
///
/// # Errors
///
/// - `HarnessError::Configuration` - Subnet too small, overlapping routes, or the terminal has no address yet
pub fn assign_addresses(
    network: &mut RadioNetwork,
    topology: &Topology,
    backhaul_subnet: Ipv4Subnet,
) -> Result<AddressMap> {
    let anchor = topology.core_anchor();
    let peer = topology.backhaul_peer();
    let assigned = network.assign_ipv4(
        backhaul_subnet,
        &[(anchor, WIRED_INTERFACE), (peer, WIRED_INTERFACE)],
    )?;
    tracing::debug!(%backhaul_subnet, ?assigned, "Backhaul addresses assigned");

    let terminal = topology.terminal();
    let address = network
        .terminal(terminal)
        .and_then(|device| device.address())
        .ok_or_else(|| {
            HarnessError::configuration(format!(
                "{terminal} has no address; activate its bearer first"
            ))
        })?;
    tracing::info!(%terminal, %address, "Addresses assigned");

    Ok(network.addresses().clone())
}

/// Installs a static route on `peer` towards `target_subnet`.
///
/// # Errors
///
/// - `HarnessError::Configuration` - `target_subnet` overlaps an existing route on `peer`
pub fn install_route(
    network: &mut RadioNetwork,
    peer: NodeId,
    target_subnet: Ipv4Subnet,
    interface: InterfaceIndex,
) -> Result<()> {
    network.add_static_route(peer, target_subnet, interface)?;
    tracing::debug!(%peer, %target_subnet, interface, "Static route installed");
    Ok(())
}

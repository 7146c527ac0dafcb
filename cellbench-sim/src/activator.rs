//! Technology-agnostic attach and bearer activation.
//!
//! The same call sequence works for either radio generation. The technology
//! only decides how a base station is chosen and which path the collaborator
//! takes to establish the bearer.

use cellbench_core::radio::{Attachable, Position, QosClass, TrafficFilter};
use cellbench_core::{Bearer, HarnessError, NodeId, RadioTechnology, Result};

use crate::network::RadioNetwork;

/// Installs radio devices, attaches terminals, and activates bearers.
#[derive(Debug, Clone, Copy)]
pub struct BearerActivator {
    technology: RadioTechnology,
}

impl BearerActivator {
    /// Creates an activator for `technology`.
    pub fn new(technology: RadioTechnology) -> Self {
        Self { technology }
    }

    /// Technology this activator drives.
    pub fn technology(&self) -> RadioTechnology {
        self.technology
    }

    fn check_network(&self, network: &RadioNetwork) -> Result<()> {
        if network.technology() != self.technology {
            return Err(HarnessError::configuration(format!(
                "activator drives {} but the network runs {}",
                self.technology,
                network.technology()
            )));
        }
        Ok(())
    }

    /// Installs a base station device on `node`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Technology mismatch or the node already has a device
    pub fn install_base_station(
        &self,
        network: &mut RadioNetwork,
        node: NodeId,
        position: Position,
    ) -> Result<()> {
        self.check_network(network)?;
        network.install_base_station_device(node, position)?;
        tracing::debug!(%node, technology = %self.technology, "Base station installed");
        Ok(())
    }

    /// Installs a terminal device on `node` and returns its IMSI.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - Technology mismatch or the node already has a device
    pub fn install_terminal(
        &self,
        network: &mut RadioNetwork,
        node: NodeId,
        position: Position,
    ) -> Result<u64> {
        self.check_network(network)?;
        let imsi = network.install_terminal_device(node, position)?;
        tracing::debug!(%node, imsi, technology = %self.technology, "Terminal installed");
        Ok(imsi)
    }

    /// Attaches `terminal` and returns the serving base station.
    ///
    /// Wide-area terminals must name their base station; attaching also sets
    /// up the default session. Short-range terminals may omit it and are
    /// attached to the nearest covering base station.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Attachment` - No base station named or found, or the attach is rejected
    /// - `HarnessError::Configuration` - `terminal` has no terminal device
    pub fn attach(
        &self,
        network: &mut RadioNetwork,
        terminal: NodeId,
        base_station: Option<NodeId>,
    ) -> Result<NodeId> {
        let serving = match (self.technology, base_station) {
            (_, Some(base_station)) => base_station,
            (RadioTechnology::ShortRangeHighBand, None) => {
                network.nearest_base_station(terminal).ok_or_else(|| {
                    HarnessError::attachment(format!("no base station covers {terminal}"))
                })?
            }
            (RadioTechnology::WideAreaCellular, None) => {
                return Err(HarnessError::attachment(format!(
                    "{} requires an explicit base station for {terminal}",
                    self.technology
                )));
            }
        };

        network.attach(terminal, serving)?;
        if self.technology == RadioTechnology::WideAreaCellular {
            network.setup_default_session(terminal)?;
        }

        tracing::info!(%terminal, base_station = %serving, "Terminal attached");
        Ok(serving)
    }

    /// Establishes a bearer of `qos` for `terminal`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::BearerActivation` - The terminal is not attached or cannot take another bearer
    /// - `HarnessError::Configuration` - Unknown terminal or address pool exhausted
    pub fn activate_bearer(
        &self,
        network: &mut RadioNetwork,
        terminal: NodeId,
        qos: QosClass,
        filter: TrafficFilter,
        max_bitrate_bps: Option<u64>,
    ) -> Result<Bearer> {
        let device = network.terminal(terminal).ok_or_else(|| {
            HarnessError::configuration(format!("{terminal} has no terminal device"))
        })?;
        if device.serving_base_station().is_none() {
            return Err(HarnessError::bearer_activation(format!(
                "{terminal} must attach before a bearer is activated"
            )));
        }
        let imsi = device.imsi();

        let bearer = match self.technology {
            RadioTechnology::WideAreaCellular => {
                network.activate_dedicated_bearer(terminal, qos, filter, max_bitrate_bps)?
            }
            RadioTechnology::ShortRangeHighBand => {
                network.activate_bearer_by_imsi(imsi, qos, filter, max_bitrate_bps)?
            }
        };

        tracing::info!(%terminal, bearer = bearer.id, %qos, "Bearer activated");
        Ok(bearer)
    }
}

//! Cellbench Core - measurement harness data model
//!
//! Technology-agnostic topology and bearer description, the packet timestamp
//! tag codec, metrics aggregation, scenario configuration, and the error
//! taxonomy shared by the simulator and the CLI.

pub mod addressing;
pub mod config;
pub mod metrics;
pub mod packet;
pub mod radio;
pub mod time;
pub mod topology;
pub mod tracing_setup;
pub mod traffic;

// Re-export main types for convenient access
pub use addressing::{AddressMap, Ipv4Subnet, RoutingTable};
pub use config::{HarnessConfig, Preset};
pub use metrics::{AggregateMetrics, DelaySample, DropReason, LatencyStats, TrafficCounters};
pub use packet::{Packet, PacketTag, TagError, TimestampTag};
pub use radio::{Bearer, QosClass, RadioTechnology};
pub use time::SimTime;
pub use topology::{LinkParams, NodeId, NodeRole, Topology};
pub use traffic::{Flow, PacketLimit};

/// Fatal harness failures.
///
/// Each variant aborts the run and maps to its own process exit code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HarnessError {
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Attachment failure: {reason}")]
    Attachment { reason: String },

    #[error("Bearer activation failure: {reason}")]
    BearerActivation { reason: String },

    #[error("Simulation aborted: {reason}")]
    SimulationAbort {
        reason: String,
        /// Metrics collected before the abort, flagged incomplete
        partial: Option<Box<AggregateMetrics>>,
    },
}

impl HarnessError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        HarnessError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn attachment(reason: impl Into<String>) -> Self {
        HarnessError::Attachment {
            reason: reason.into(),
        }
    }

    pub fn bearer_activation(reason: impl Into<String>) -> Self {
        HarnessError::BearerActivation {
            reason: reason.into(),
        }
    }

    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Configuration { .. } => 2,
            HarnessError::Attachment { .. } => 3,
            HarnessError::BearerActivation { .. } => 4,
            HarnessError::SimulationAbort { .. } => 5,
        }
    }

    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            HarnessError::Configuration { reason } => format!("Invalid scenario: {reason}"),
            HarnessError::Attachment { reason } => {
                format!("Terminal could not attach to a base station: {reason}")
            }
            HarnessError::BearerActivation { reason } => {
                format!("Bearer could not be established: {reason}")
            }
            HarnessError::SimulationAbort { reason, partial } => match partial {
                Some(_) => format!("Simulation aborted ({reason}); partial metrics follow"),
                None => format!("Simulation aborted: {reason}"),
            },
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, HarnessError::Configuration { .. })
    }

    /// Metrics gathered before an abort, if any.
    pub fn partial_metrics(&self) -> Option<&AggregateMetrics> {
        match self {
            HarnessError::SimulationAbort {
                partial: Some(metrics),
                ..
            } => Some(metrics),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let errors = [
            HarnessError::configuration("bad"),
            HarnessError::attachment("none"),
            HarnessError::bearer_activation("early"),
            HarnessError::SimulationAbort {
                reason: "limit".to_string(),
                partial: None,
            },
        ];

        let mut codes: Vec<u8> = errors.iter().map(HarnessError::exit_code).collect();
        assert!(codes.iter().all(|code| *code != 0));
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn test_user_error_classification() {
        assert!(HarnessError::configuration("bad").is_user_error());
        assert!(!HarnessError::attachment("none").is_user_error());
        assert!(
            HarnessError::bearer_activation("early")
                .user_message()
                .contains("early")
        );
    }

    #[test]
    fn test_partial_metrics_only_on_abort() {
        assert!(HarnessError::configuration("bad").partial_metrics().is_none());

        let abort = HarnessError::SimulationAbort {
            reason: "limit".to_string(),
            partial: None,
        };
        assert!(abort.partial_metrics().is_none());
    }
}

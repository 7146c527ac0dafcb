//! Fixed-rate datagram flow description.

use std::time::Duration;

use serde::Serialize;

use crate::time::SimTime;
use crate::{HarnessError, Result};

/// How many packets a generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketLimit {
    /// Stop after this many packets
    Count(u64),
    /// Send until the stop time
    Continuous,
}

impl PacketLimit {
    /// Whether `sent` packets exhaust the limit.
    pub fn is_reached(&self, sent: u64) -> bool {
        match self {
            PacketLimit::Count(limit) => sent >= *limit,
            PacketLimit::Continuous => false,
        }
    }
}

/// Generator configuration paired with the sink it targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flow {
    /// Payload bytes per packet
    pub packet_size: u32,
    pub limit: PacketLimit,
    pub interval: Duration,
    pub start: SimTime,
    /// First instant at which no more packets are sent
    pub stop: SimTime,
    /// Destination port of the paired sink
    pub sink_port: u16,
}

impl Flow {
    /// Rejects empty packets, zero intervals, and inverted windows.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - A flow parameter is invalid
    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(HarnessError::configuration("packet size must be positive"));
        }
        if self.interval.is_zero() {
            return Err(HarnessError::configuration(
                "inter-packet interval must be positive",
            ));
        }
        if self.stop < self.start {
            return Err(HarnessError::configuration(format!(
                "generator stop {} precedes start {}",
                self.stop, self.start
            )));
        }
        if self.limit == PacketLimit::Count(0) {
            return Err(HarnessError::configuration("packet count must be positive"));
        }
        Ok(())
    }

    /// Length of the generator's active interval.
    pub fn window(&self) -> Duration {
        self.stop - self.start
    }

    /// Offered load in bits per second.
    pub fn offered_load_bps(&self) -> f64 {
        self.packet_size as f64 * 8.0 / self.interval.as_secs_f64()
    }

    /// Upper bound on packets this flow can emit.
    pub fn max_packets(&self) -> u64 {
        let window = self.window().as_nanos();
        let interval = self.interval.as_nanos().max(1);
        let by_time = window.div_ceil(interval) as u64;
        match self.limit {
            PacketLimit::Count(limit) => by_time.min(limit),
            PacketLimit::Continuous => by_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency_flow() -> Flow {
        Flow {
            packet_size: 512,
            limit: PacketLimit::Count(100),
            interval: Duration::from_millis(100),
            start: SimTime::from_millis(2000),
            stop: SimTime::from_millis(3900),
            sink_port: 1234,
        }
    }

    #[test]
    fn test_flow_window_and_bounds() {
        let flow = latency_flow();
        assert_eq!(flow.window(), Duration::from_millis(1900));
        assert_eq!(flow.max_packets(), 19);
        assert!((flow.offered_load_bps() - 40_960.0).abs() < 1e-6);
    }

    #[test]
    fn test_count_limit_caps_max_packets() {
        let flow = Flow {
            stop: SimTime::from_secs_f64(60.0),
            ..latency_flow()
        };
        assert_eq!(flow.max_packets(), 100);
    }

    #[test]
    fn test_invalid_flows_are_rejected() {
        let inverted = Flow {
            stop: SimTime::from_millis(1000),
            ..latency_flow()
        };
        assert!(inverted.validate().is_err());

        let empty = Flow {
            packet_size: 0,
            ..latency_flow()
        };
        assert!(empty.validate().is_err());

        let zero_interval = Flow {
            interval: Duration::ZERO,
            ..latency_flow()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_packet_limit() {
        assert!(PacketLimit::Count(3).is_reached(3));
        assert!(!PacketLimit::Count(3).is_reached(2));
        assert!(!PacketLimit::Continuous.is_reached(u64::MAX));
    }
}

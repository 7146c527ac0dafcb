//! Wired point-to-point channel with a drop-tail transmit queue.

use std::collections::VecDeque;

use cellbench_core::metrics::DropReason;
use cellbench_core::{LinkParams, Packet, SimTime};

/// One direction of a wired segment.
///
/// Packets are serialized one at a time at the line rate, then propagate for
/// the link delay. At most `queue_packets` packets may wait for or occupy the
/// transmitter; further packets are dropped.
#[derive(Debug, Clone)]
pub struct PointToPointChannel {
    params: LinkParams,
    drop_reason: DropReason,
    busy_until: SimTime,
    // Transmission end times of packets not yet fully on the wire
    backlog: VecDeque<SimTime>,
    transmitted: u64,
    dropped: u64,
}

impl PointToPointChannel {
    /// Creates an idle channel that reports queue overflow as `drop_reason`.
    pub fn new(params: LinkParams, drop_reason: DropReason) -> Self {
        Self {
            params,
            drop_reason,
            busy_until: SimTime::ZERO,
            backlog: VecDeque::new(),
            transmitted: 0,
            dropped: 0,
        }
    }

    /// Link parameters of this channel.
    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    /// Enqueues `packet` at `now` and returns its arrival time at the far end.
    ///
    /// Strips packet metadata when the link does not propagate it.
    ///
    /// # Errors
    ///
    /// - `DropReason` - The transmit queue is full
    pub fn transmit(&mut self, now: SimTime, packet: &mut Packet) -> Result<SimTime, DropReason> {
        while self.backlog.front().is_some_and(|end| *end <= now) {
            self.backlog.pop_front();
        }
        if self.backlog.len() >= self.params.queue_packets {
            self.dropped += 1;
            return Err(self.drop_reason);
        }

        let start = now.max(self.busy_until);
        let end = start + self.params.serialization_delay(packet.size());
        self.busy_until = end;
        self.backlog.push_back(end);
        self.transmitted += 1;

        if !self.params.propagates_metadata {
            packet.strip_metadata();
        }

        Ok(end + self.params.propagation_delay)
    }

    /// Packets accepted so far.
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    /// Packets refused by the full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cellbench_core::{PacketTag, TimestampTag};

    use super::*;

    fn gigabit(delay_ms: u64) -> LinkParams {
        LinkParams::new(1_000_000_000, Duration::from_millis(delay_ms))
    }

    #[test]
    fn test_arrival_is_serialization_plus_propagation() {
        let mut channel = PointToPointChannel::new(gigabit(30), DropReason::BackhaulQueue);
        let mut packet = Packet::new(0, 512);

        let arrival = channel.transmit(SimTime::ZERO, &mut packet).unwrap();

        assert_eq!(
            arrival,
            SimTime::ZERO + Duration::from_nanos(4_096) + Duration::from_millis(30)
        );
    }

    #[test]
    fn test_back_to_back_packets_queue_behind_each_other() {
        let mut channel = PointToPointChannel::new(gigabit(1), DropReason::BackhaulQueue);

        let first = channel.transmit(SimTime::ZERO, &mut Packet::new(0, 1500)).unwrap();
        let second = channel.transmit(SimTime::ZERO, &mut Packet::new(1, 1500)).unwrap();

        assert_eq!(second - first, Duration::from_nanos(12_000));
    }

    #[test]
    fn test_drop_tail_when_queue_is_full() {
        let mut params = LinkParams::new(8_000, Duration::from_millis(1));
        params.queue_packets = 2;
        let mut channel = PointToPointChannel::new(params, DropReason::TransportQueue);

        assert!(channel.transmit(SimTime::ZERO, &mut Packet::new(0, 1000)).is_ok());
        assert!(channel.transmit(SimTime::ZERO, &mut Packet::new(1, 1000)).is_ok());
        assert_eq!(
            channel.transmit(SimTime::ZERO, &mut Packet::new(2, 1000)),
            Err(DropReason::TransportQueue)
        );
        assert_eq!(channel.dropped(), 1);

        // First packet finishes after one second at 8 kbps
        let later = SimTime::from_millis(1000);
        assert!(channel.transmit(later, &mut Packet::new(3, 1000)).is_ok());
        assert_eq!(channel.transmitted(), 3);
    }

    #[test]
    fn test_metadata_is_stripped_when_not_propagated() {
        let mut params = gigabit(1);
        params.propagates_metadata = false;
        let mut channel = PointToPointChannel::new(params, DropReason::BackhaulQueue);

        let mut packet = Packet::new(0, 512);
        packet
            .add_tag(PacketTag::Timestamp(TimestampTag::new(SimTime::ZERO)))
            .unwrap();
        channel.transmit(SimTime::ZERO, &mut packet).unwrap();

        assert!(!packet.is_tagged());
        assert_eq!(packet.size(), 512);
    }
}

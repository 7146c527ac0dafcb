//! Fixed-rate datagram generator and counting sink.
//!
//! Both applications expose an explicit notification channel: observers
//! subscribe when the scenario is wired and are called synchronously on every
//! egress or ingress.

use std::net::Ipv4Addr;

use cellbench_core::metrics::{DropReason, MeasurementWindow};
use cellbench_core::packet::PacketUid;
use cellbench_core::{Flow, NodeId, Packet, SimTime};
use serde::Serialize;

/// Receives every packet a generator emits, before it leaves the node.
pub trait EgressObserver {
    /// Called once per generated packet at its send time.
    fn on_egress(&mut self, now: SimTime, packet: &mut Packet);
}

/// Receives every packet a sink accepts.
pub trait IngressObserver {
    /// Called once per counted packet at its receive time.
    fn on_ingress(&mut self, now: SimTime, packet: &Packet);
}

/// Fixed-rate datagram source.
pub struct UdpGenerator {
    node: NodeId,
    flow: Flow,
    destination: Ipv4Addr,
    running: bool,
    sent: u64,
    next_uid: PacketUid,
    observers: Vec<Box<dyn EgressObserver>>,
}

impl UdpGenerator {
    /// Creates an idle generator on `node` sending `flow` to `destination`.
    pub fn new(node: NodeId, flow: Flow, destination: Ipv4Addr) -> Self {
        Self {
            node,
            flow,
            destination,
            running: false,
            sent: 0,
            next_uid: 0,
            observers: Vec::new(),
        }
    }

    /// Registers an egress observer.
    pub fn subscribe(&mut self, observer: Box<dyn EgressObserver>) {
        self.observers.push(observer);
    }

    /// Node the generator runs on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Flow this generator emits.
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Address packets are sent to.
    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// Activates the generator.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Deactivates the generator. Stop is final.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether the generator is active.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Packets emitted so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn may_send(&self, now: SimTime) -> bool {
        self.running && now < self.flow.stop && !self.flow.limit.is_reached(self.sent)
    }

    /// Emits the next packet at `now` and notifies every egress observer.
    ///
    /// Returns `None` when the generator is stopped, past its stop time, or
    /// has reached its packet count.
    pub fn emit(&mut self, now: SimTime) -> Option<Packet> {
        if !self.may_send(now) {
            return None;
        }

        let mut packet = Packet::new(self.next_uid, self.flow.packet_size);
        self.next_uid += 1;
        self.sent += 1;

        for observer in &mut self.observers {
            observer.on_egress(now, &mut packet);
        }

        tracing::trace!(uid = packet.uid(), at = %now, "Generator emitted packet");
        Some(packet)
    }

    /// Time of the following send, if the generator will still be active then.
    pub fn next_send_time(&self, now: SimTime) -> Option<SimTime> {
        let next = now + self.flow.interval;
        (self.running && next < self.flow.stop && !self.flow.limit.is_reached(self.sent))
            .then_some(next)
    }
}

/// Counters kept by a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkCounters {
    /// Packets counted
    pub packets: u64,
    /// Payload bytes counted
    pub bytes: u64,
    /// Counted packets that carried metadata
    pub tagged: u64,
    /// Counted packets received inside the measurement window
    pub in_window: u64,
}

/// Counting datagram sink bound to a port.
pub struct UdpSink {
    node: NodeId,
    port: u16,
    open: bool,
    measurement: Option<MeasurementWindow>,
    counters: SinkCounters,
    observers: Vec<Box<dyn IngressObserver>>,
}

impl UdpSink {
    /// Creates a closed sink on `node` listening on `port`.
    pub fn new(node: NodeId, port: u16) -> Self {
        Self {
            node,
            port,
            open: false,
            measurement: None,
            counters: SinkCounters::default(),
            observers: Vec::new(),
        }
    }

    /// Registers an ingress observer.
    pub fn subscribe(&mut self, observer: Box<dyn IngressObserver>) {
        self.observers.push(observer);
    }

    /// Restricts `in_window` to receipts inside `window`.
    ///
    /// Without a window every counted packet is also counted in `in_window`.
    pub fn measure_within(&mut self, window: MeasurementWindow) {
        self.measurement = Some(window);
    }

    /// Node the sink runs on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Port the sink listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Opens the sink.
    pub fn start(&mut self) {
        self.open = true;
    }

    /// Closes the sink.
    pub fn stop(&mut self) {
        self.open = false;
    }

    /// Counters so far.
    pub fn counters(&self) -> SinkCounters {
        self.counters
    }

    /// Counts `packet` and notifies every ingress observer.
    ///
    /// Packets are counted whether or not they carry a tag.
    ///
    /// # Errors
    ///
    /// - `DropReason::SinkClosed` - The sink is not open or listens on another port
    pub fn receive(&mut self, now: SimTime, port: u16, packet: &Packet) -> Result<(), DropReason> {
        if !self.open || port != self.port {
            return Err(DropReason::SinkClosed);
        }

        self.counters.packets += 1;
        self.counters.bytes += packet.size() as u64;
        if packet.is_tagged() {
            self.counters.tagged += 1;
        }
        if self.measurement.is_none_or(|window| window.contains(now)) {
            self.counters.in_window += 1;
        }

        for observer in &mut self.observers {
            observer.on_ingress(now, packet);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use cellbench_core::PacketLimit;

    use super::*;

    fn flow(limit: PacketLimit) -> Flow {
        Flow {
            packet_size: 512,
            limit,
            interval: Duration::from_millis(100),
            start: SimTime::from_millis(2000),
            stop: SimTime::from_millis(2500),
            sink_port: 1234,
        }
    }

    fn generator(limit: PacketLimit) -> UdpGenerator {
        UdpGenerator::new(NodeId::new(3), flow(limit), Ipv4Addr::new(7, 0, 0, 2))
    }

    /// Drives a generator the way the event loop does.
    fn run(generator: &mut UdpGenerator) -> Vec<SimTime> {
        generator.start();
        let mut sends = Vec::new();
        let mut now = Some(generator.flow().start);
        while let Some(at) = now {
            if generator.emit(at).is_some() {
                sends.push(at);
            }
            now = generator.next_send_time(at);
        }
        sends
    }

    #[test]
    fn test_stop_time_is_exclusive() {
        let mut generator = generator(PacketLimit::Continuous);
        let sends = run(&mut generator);

        assert_eq!(sends.len(), 5);
        assert_eq!(sends.last(), Some(&SimTime::from_millis(2400)));
        assert!(generator.emit(SimTime::from_millis(2500)).is_none());
    }

    #[test]
    fn test_count_limit_stops_generator() {
        let mut generator = generator(PacketLimit::Count(3));
        let sends = run(&mut generator);

        assert_eq!(sends.len(), 3);
        assert_eq!(generator.sent(), 3);
    }

    #[test]
    fn test_stopped_generator_is_silent() {
        let mut generator = generator(PacketLimit::Continuous);
        assert!(generator.emit(SimTime::from_millis(2000)).is_none());

        generator.start();
        generator.stop();
        assert!(generator.emit(SimTime::from_millis(2000)).is_none());
        assert_eq!(generator.sent(), 0);
    }

    struct Recording(Rc<RefCell<Vec<u64>>>);

    impl EgressObserver for Recording {
        fn on_egress(&mut self, _now: SimTime, packet: &mut Packet) {
            self.0.borrow_mut().push(packet.uid());
        }
    }

    impl IngressObserver for Recording {
        fn on_ingress(&mut self, _now: SimTime, packet: &Packet) {
            self.0.borrow_mut().push(packet.uid());
        }
    }

    #[test]
    fn test_observers_see_every_packet() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut generator = generator(PacketLimit::Count(2));
        generator.subscribe(Box::new(Recording(seen.clone())));

        run(&mut generator);

        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_sink_counts_only_while_open() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sink = UdpSink::new(NodeId::new(2), 1234);
        sink.subscribe(Box::new(Recording(seen.clone())));
        let packet = Packet::new(7, 512);

        assert_eq!(
            sink.receive(SimTime::ZERO, 1234, &packet),
            Err(DropReason::SinkClosed)
        );

        sink.start();
        sink.receive(SimTime::ZERO, 1234, &packet).unwrap();
        assert_eq!(
            sink.receive(SimTime::ZERO, 9, &packet),
            Err(DropReason::SinkClosed)
        );

        sink.stop();
        assert!(sink.receive(SimTime::ZERO, 1234, &packet).is_err());

        assert_eq!(
            sink.counters(),
            SinkCounters {
                packets: 1,
                bytes: 512,
                tagged: 0,
                in_window: 1,
            }
        );
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn test_sink_separates_receipts_after_the_window() {
        let mut sink = UdpSink::new(NodeId::new(2), 1234);
        sink.measure_within(MeasurementWindow {
            start: SimTime::from_millis(1000),
            stop: SimTime::from_millis(2000),
        });
        sink.start();
        let packet = Packet::new(0, 512);

        for at_ms in [1000, 1500, 1999, 2000, 2040] {
            sink.receive(SimTime::from_millis(at_ms), 1234, &packet).unwrap();
        }

        let counters = sink.counters();
        assert_eq!(counters.packets, 5);
        assert_eq!(counters.in_window, 3);
    }
}

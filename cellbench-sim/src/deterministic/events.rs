//! Event types and ordering for the event clock.

use std::cmp::Ordering;

use cellbench_core::SimTime;

use crate::network::Datagram;

/// Priority levels for simulation events.
///
/// Lower numeric values run first when events share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Simulation stop
    Critical = 0,
    /// Application start and stop
    High = 1,
    /// Packet sends and arrivals
    Normal = 2,
}

/// Types of events that can occur in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    /// Sink begins counting
    SinkStart,
    /// Sink stops counting
    SinkStop,
    /// Generator becomes active
    GeneratorStart,
    /// Generator stops emitting
    GeneratorStop,
    /// Generator emits its next packet
    GeneratorSend,
    /// Packet leaves the backhaul and reaches the core anchor
    AnchorArrival {
        /// Packet in flight
        datagram: Datagram,
    },
    /// Packet leaves the transport segment and reaches the base station
    BaseStationArrival {
        /// Packet in flight
        datagram: Datagram,
    },
    /// Packet is decoded by the terminal
    TerminalDelivery {
        /// Packet in flight
        datagram: Datagram,
    },
    /// Simulation stop time reached
    Stop,
}

impl EventType {
    /// Returns string representation of event type for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SinkStart => "SinkStart",
            EventType::SinkStop => "SinkStop",
            EventType::GeneratorStart => "GeneratorStart",
            EventType::GeneratorStop => "GeneratorStop",
            EventType::GeneratorSend => "GeneratorSend",
            EventType::AnchorArrival { .. } => "AnchorArrival",
            EventType::BaseStationArrival { .. } => "BaseStationArrival",
            EventType::TerminalDelivery { .. } => "TerminalDelivery",
            EventType::Stop => "Stop",
        }
    }
}

/// Simulation event with timestamp and priority.
#[derive(Debug, Clone)]
pub struct SimulationEvent {
    /// Unique event ID for deterministic ordering
    pub id: u64,
    /// Scheduled execution time
    pub timestamp: SimTime,
    /// Type of event
    pub event_type: EventType,
    /// Priority for events at same timestamp
    pub priority: EventPriority,
}

impl SimulationEvent {
    /// Creates new simulation event.
    pub fn new(id: u64, timestamp: SimTime, event_type: EventType, priority: EventPriority) -> Self {
        Self {
            id,
            timestamp,
            event_type,
            priority,
        }
    }
}

impl Eq for SimulationEvent {}

impl PartialEq for SimulationEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for SimulationEvent {
    /// Reversed `(timestamp, priority, id)` so a max-heap pops the earliest,
    /// most urgent, first-scheduled event.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.priority, self.id)
            .cmp(&(other.timestamp, other.priority, other.id))
            .reverse()
    }
}

impl PartialOrd for SimulationEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

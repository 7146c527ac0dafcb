//! Deterministic discrete-event engine.
//!
//! A single event clock drives every run. Events execute one at a time in
//! `(timestamp, priority, id)` order, so identical inputs and seeds always
//! replay identically.

mod clock;
mod events;
mod scheduler;

pub use clock::{DeterministicClock, DeterministicRng};
pub use events::{EventPriority, EventType, SimulationEvent};
pub use scheduler::{EventClock, EventStatistics, MAX_EVENT_QUEUE_SIZE, SimulationError};

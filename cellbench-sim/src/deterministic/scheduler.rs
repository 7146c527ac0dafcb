//! Event clock: the single scheduler of a simulation run.

use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use cellbench_core::SimTime;
use serde::Serialize;
use thiserror::Error;

use super::clock::DeterministicClock;
use super::events::{EventPriority, EventType, SimulationEvent};

/// Maximum number of events that can be pending at once.
pub const MAX_EVENT_QUEUE_SIZE: usize = 1_000_000;

/// Engine-level failures of the event clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// Event queue exceeded maximum capacity
    #[error("Event queue overflow: {count} events pending")]
    EventQueueOverflow {
        /// Number of pending events when the push was refused
        count: usize,
    },

    /// More events were processed than the run allows
    #[error("Event limit exceeded: {limit} events processed")]
    EventLimitExceeded {
        /// Configured bound
        limit: u64,
    },

    /// Event could not be scheduled properly
    #[error("Invalid event scheduling: {reason}")]
    InvalidEventScheduling {
        /// Reason why scheduling failed
        reason: String,
    },

    /// Clock was used after being destroyed
    #[error("Event clock has been destroyed")]
    ClockDestroyed,
}

/// Counts of processed events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventStatistics {
    /// Total events processed
    pub events_processed: u64,
    /// Events by type
    pub events_by_type: BTreeMap<String, u64>,
}

impl EventStatistics {
    /// Records one processed event.
    pub fn record_event(&mut self, event_type: &str) {
        self.events_processed += 1;
        *self
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;
    }

    /// Returns how many events of `event_type` were processed.
    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }
}

/// Discrete event clock with run, stop, and destroy lifecycle.
///
/// Events execute strictly in non-decreasing timestamp order. Only the owner
/// of the clock can advance it, by pulling the next event.
#[derive(Debug)]
pub struct EventClock {
    clock: DeterministicClock,
    event_queue: BinaryHeap<SimulationEvent>,
    next_event_id: u64,
    max_events: u64,
    stop_time: Option<SimTime>,
    statistics: EventStatistics,
}

impl EventClock {
    /// Creates an empty clock at time zero that processes at most `max_events`.
    pub fn new(max_events: u64) -> Self {
        Self {
            clock: DeterministicClock::new(),
            event_queue: BinaryHeap::new(),
            next_event_id: 0,
            max_events,
            stop_time: None,
            statistics: EventStatistics::default(),
        }
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Returns the scheduled stop time, if any.
    pub fn stop_time(&self) -> Option<SimTime> {
        self.stop_time
    }

    /// Returns number of pending events.
    pub fn pending(&self) -> usize {
        self.event_queue.len()
    }

    /// Returns counts of processed events.
    pub fn statistics(&self) -> &EventStatistics {
        &self.statistics
    }

    /// Schedules an event at an absolute time.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ClockDestroyed` - Clock was already destroyed
    /// - `SimulationError::InvalidEventScheduling` - Time is in the past
    /// - `SimulationError::EventQueueOverflow` - Too many pending events
    pub fn schedule_at(
        &mut self,
        timestamp: SimTime,
        event_type: EventType,
        priority: EventPriority,
    ) -> Result<u64, SimulationError> {
        if self.clock.is_destroyed() {
            return Err(SimulationError::ClockDestroyed);
        }
        if timestamp < self.clock.now() {
            return Err(SimulationError::InvalidEventScheduling {
                reason: format!(
                    "{} scheduled at {} which is before now ({})",
                    event_type.as_str(),
                    timestamp,
                    self.clock.now()
                ),
            });
        }
        if self.event_queue.len() >= MAX_EVENT_QUEUE_SIZE {
            return Err(SimulationError::EventQueueOverflow {
                count: self.event_queue.len(),
            });
        }

        let id = self.next_event_id;
        self.next_event_id += 1;
        self.event_queue
            .push(SimulationEvent::new(id, timestamp, event_type, priority));
        Ok(id)
    }

    /// Schedules an event after a delay from now.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ClockDestroyed` - Clock was already destroyed
    /// - `SimulationError::EventQueueOverflow` - Too many pending events
    pub fn schedule_in(
        &mut self,
        delay: Duration,
        event_type: EventType,
        priority: EventPriority,
    ) -> Result<u64, SimulationError> {
        let timestamp = self.clock.now() + delay;
        self.schedule_at(timestamp, event_type, priority)
    }

    /// Schedules the stop event. Nothing at or after `timestamp` executes.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidEventScheduling` - A stop time is already set or is in the past
    /// - `SimulationError::ClockDestroyed` - Clock was already destroyed
    pub fn stop_at(&mut self, timestamp: SimTime) -> Result<(), SimulationError> {
        if let Some(existing) = self.stop_time {
            return Err(SimulationError::InvalidEventScheduling {
                reason: format!("Stop already scheduled at {existing}"),
            });
        }
        self.schedule_at(timestamp, EventType::Stop, EventPriority::Critical)?;
        self.stop_time = Some(timestamp);
        Ok(())
    }

    /// Pops the next event and advances the clock to it.
    ///
    /// Returns `Ok(None)` once no events remain.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ClockDestroyed` - Clock was already destroyed
    /// - `SimulationError::EventLimitExceeded` - The processed-event bound was reached
    pub fn next_event(&mut self) -> Result<Option<SimulationEvent>, SimulationError> {
        if self.clock.is_destroyed() {
            return Err(SimulationError::ClockDestroyed);
        }
        if self.event_queue.is_empty() {
            return Ok(None);
        }
        if self.statistics.events_processed >= self.max_events {
            return Err(SimulationError::EventLimitExceeded {
                limit: self.max_events,
            });
        }

        let Some(event) = self.event_queue.pop() else {
            return Ok(None);
        };
        self.clock.advance_to(event.timestamp)?;
        self.statistics.record_event(event.event_type.as_str());

        tracing::trace!(
            id = event.id,
            at = %event.timestamp,
            "Processing {}",
            event.event_type.as_str()
        );

        Ok(Some(event))
    }

    /// Releases all pending events. No further events are possible.
    pub fn destroy(&mut self) {
        let discarded = self.event_queue.len();
        self.event_queue.clear();
        self.clock.destroy();
        tracing::debug!(discarded, at = %self.clock.now(), "Event clock destroyed");
    }

    /// Returns true once the clock has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.clock.is_destroyed()
    }
}

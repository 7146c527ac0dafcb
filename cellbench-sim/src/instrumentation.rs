//! Packet timestamp tagger and delay correlator.
//!
//! The tagger stamps each generated packet with its send time; the correlator
//! turns each stamped arrival into a one-way delay sample. Samples accumulate
//! in a shared [`SampleRecorder`] the driver reads once the run has stopped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cellbench_core::{DelaySample, Packet, PacketTag, SimTime, TagError, TimestampTag};

use crate::applications::{EgressObserver, IngressObserver};

/// Attaches a send-time stamp to every egress packet.
#[derive(Debug, Default)]
pub struct TimestampTagger;

impl TimestampTagger {
    /// Creates a tagger.
    pub fn new() -> Self {
        Self
    }
}

impl EgressObserver for TimestampTagger {
    fn on_egress(&mut self, now: SimTime, packet: &mut Packet) {
        if let Err(error) = packet.add_tag(PacketTag::Timestamp(TimestampTag::new(now))) {
            tracing::warn!(uid = packet.uid(), %error, "Packet was not tagged");
        }
    }
}

/// Shared, append-only store of delay samples.
#[derive(Debug, Clone, Default)]
pub struct SampleRecorder {
    samples: Rc<RefCell<Vec<DelaySample>>>,
}

impl SampleRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, sample: DelaySample) {
        self.samples.borrow_mut().push(sample);
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    /// Returns true if no sample was recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.borrow().is_empty()
    }

    /// Copies the samples out, in arrival order.
    pub fn snapshot(&self) -> Vec<DelaySample> {
        self.samples.borrow().clone()
    }
}

/// Emits a delay sample for every ingress packet that carries a timestamp.
#[derive(Debug)]
pub struct DelayCorrelator {
    recorder: SampleRecorder,
    untagged: Rc<Cell<u64>>,
}

impl DelayCorrelator {
    /// Creates a correlator writing into `recorder`.
    pub fn new(recorder: SampleRecorder) -> Self {
        Self {
            recorder,
            untagged: Rc::new(Cell::new(0)),
        }
    }

    /// Handle to the count of arrivals that produced no sample.
    pub fn untagged_counter(&self) -> Rc<Cell<u64>> {
        self.untagged.clone()
    }
}

impl IngressObserver for DelayCorrelator {
    fn on_ingress(&mut self, now: SimTime, packet: &Packet) {
        match packet.timestamp() {
            Ok(tag) if tag.sent_at() <= now => {
                self.recorder.record(DelaySample {
                    sent_at: tag.sent_at(),
                    received_at: now,
                });
            }
            Ok(tag) => {
                self.untagged.set(self.untagged.get() + 1);
                tracing::debug!(
                    uid = packet.uid(),
                    sent_at = %tag.sent_at(),
                    at = %now,
                    "Ignoring timestamp from the future"
                );
            }
            Err(TagError::Missing { .. }) => {
                self.untagged.set(self.untagged.get() + 1);
                tracing::trace!(uid = packet.uid(), "Packet carries no timestamp");
            }
            Err(error) => {
                self.untagged.set(self.untagged.get() + 1);
                tracing::debug!(uid = packet.uid(), %error, "Unreadable timestamp");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tagged(uid: u64, sent_at: SimTime) -> Packet {
        let mut packet = Packet::new(uid, 512);
        TimestampTagger::new().on_egress(sent_at, &mut packet);
        packet
    }

    #[test]
    fn test_tagger_stamps_send_time_once() {
        let mut packet = tagged(0, SimTime::from_millis(2000));
        assert_eq!(
            packet.timestamp().unwrap().sent_at(),
            SimTime::from_millis(2000)
        );

        // A second tagger leaves the original stamp alone
        TimestampTagger::new().on_egress(SimTime::from_millis(3000), &mut packet);
        assert_eq!(
            packet.timestamp().unwrap().sent_at(),
            SimTime::from_millis(2000)
        );
    }

    #[test]
    fn test_correlator_records_one_way_delay() {
        let recorder = SampleRecorder::new();
        let mut correlator = DelayCorrelator::new(recorder.clone());

        let packet = tagged(0, SimTime::from_millis(2000));
        correlator.on_ingress(SimTime::from_millis(2064), &packet);

        let samples = recorder.snapshot();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delay(), Duration::from_millis(64));
    }

    #[test]
    fn test_missing_tag_is_absorbed() {
        let recorder = SampleRecorder::new();
        let mut correlator = DelayCorrelator::new(recorder.clone());
        let untagged = correlator.untagged_counter();

        correlator.on_ingress(SimTime::from_millis(10), &Packet::new(1, 512));

        assert!(recorder.is_empty());
        assert_eq!(untagged.get(), 1);
    }

    #[test]
    fn test_future_timestamp_is_ignored() {
        let recorder = SampleRecorder::new();
        let mut correlator = DelayCorrelator::new(recorder.clone());

        let packet = tagged(0, SimTime::from_millis(50));
        correlator.on_ingress(SimTime::from_millis(10), &packet);

        assert_eq!(recorder.len(), 0);
    }
}

//! Metrics aggregation.
//!
//! Turns sink counters and one-way delay samples into throughput and latency
//! figures. Aggregation is a pure function of its inputs and runs exactly once
//! per scenario, after the simulation has stopped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::time::{SimTime, duration_nanos};

/// One-way delay observed for a tagged packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelaySample {
    pub sent_at: SimTime,
    pub received_at: SimTime,
}

impl DelaySample {
    pub fn delay(&self) -> Duration {
        self.received_at - self.sent_at
    }
}

/// Why the data path discarded a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DropReason {
    /// Backhaul drop-tail queue full
    BackhaulQueue,
    /// Anchor to base station transport queue full
    TransportQueue,
    /// Radio scheduler could not serve the packet within its queueing budget
    RadioQueue,
    /// Every HARQ attempt failed
    HarqExhausted,
    /// Sender has no route to the destination
    NoRoute,
    /// Destination terminal has no bearer admitting the packet
    NoBearer,
    /// Packet reached the sink outside its open window
    SinkClosed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::BackhaulQueue => "backhaul queue",
            DropReason::TransportQueue => "transport queue",
            DropReason::RadioQueue => "radio queue",
            DropReason::HarqExhausted => "HARQ exhausted",
            DropReason::NoRoute => "no route",
            DropReason::NoBearer => "no bearer",
            DropReason::SinkClosed => "sink closed",
        };
        write!(f, "{name}")
    }
}

/// Packet counters collected at the generator and the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Received packets whose receive time falls inside the measurement window
    pub received_in_window: u64,
    /// Received packets that still carried a timestamp tag
    pub tagged_received: u64,
    /// Received packets that yielded no delay sample
    pub untagged_received: u64,
    pub drops: BTreeMap<DropReason, u64>,
}

impl TrafficCounters {
    pub fn record_drop(&mut self, reason: DropReason) {
        *self.drops.entry(reason).or_insert(0) += 1;
    }

    pub fn total_dropped(&self) -> u64 {
        self.drops.values().sum()
    }
}

/// Generator's active interval, which throughput is normalized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeasurementWindow {
    pub start: SimTime,
    pub stop: SimTime,
}

impl MeasurementWindow {
    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    /// Whether `at` lies in `[start, stop)`.
    pub fn contains(&self, at: SimTime) -> bool {
        self.start <= at && at < self.stop
    }
}

/// Latency statistics derived from delay samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub stddev: Duration,
    /// Mean absolute difference between consecutive samples in arrival order
    pub jitter: Duration,
}

impl LatencyStats {
    /// Computes statistics over `samples`, or `None` when there are none.
    pub fn from_samples(samples: &[DelaySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let delays: Vec<u64> = samples
            .iter()
            .map(|sample| duration_nanos(sample.delay()))
            .collect();
        let mut sorted = delays.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u128 = sorted.iter().map(|delay| *delay as u128).sum();
        let mean = (sum / count as u128) as u64;

        let variance = sorted
            .iter()
            .map(|delay| {
                let diff = *delay as f64 - mean as f64;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;

        let jitter = if count > 1 {
            let total: u128 = delays
                .windows(2)
                .map(|pair| pair[0].abs_diff(pair[1]) as u128)
                .sum();
            (total / (count as u128 - 1)) as u64
        } else {
            0
        };

        Some(Self {
            count,
            min: Duration::from_nanos(sorted[0]),
            mean: Duration::from_nanos(mean),
            max: Duration::from_nanos(sorted[count - 1]),
            p50: Duration::from_nanos(nearest_rank(&sorted, 50.0)),
            p95: Duration::from_nanos(nearest_rank(&sorted, 95.0)),
            p99: Duration::from_nanos(nearest_rank(&sorted, 99.0)),
            stddev: Duration::from_nanos(variance.sqrt().round() as u64),
            jitter: Duration::from_nanos(jitter),
        })
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Final throughput and latency figures of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total_sent: u64,
    pub total_received: u64,
    /// Receipts inside the measurement window, which throughput counts
    pub received_in_window: u64,
    pub tagged_received: u64,
    pub untagged_received: u64,
    pub packet_size: u32,
    pub window: MeasurementWindow,
    pub measurement_window_seconds: f64,
    pub throughput_bps: f64,
    /// Absent when no tagged packet was received
    pub latency: Option<LatencyStats>,
    pub drops: BTreeMap<DropReason, u64>,
    /// False when the run was aborted before reaching its stop time
    pub complete: bool,
}

impl AggregateMetrics {
    /// Derives metrics from counters and samples.
    ///
    /// Throughput is `received × packet_size × 8 / window`, where the window is
    /// the generator's active interval and only packets received inside it
    /// count. Backlog delivered after the generator stops is still part of
    /// `total_received`. A zero-length window yields zero throughput.
    pub fn compute(
        counters: &TrafficCounters,
        samples: &[DelaySample],
        window: MeasurementWindow,
        packet_size: u32,
    ) -> Self {
        let window_seconds = window.duration().as_secs_f64();
        let throughput_bps = if window_seconds > 0.0 {
            (counters.received_in_window as f64 * packet_size as f64 * 8.0) / window_seconds
        } else {
            0.0
        };

        Self {
            total_sent: counters.packets_sent,
            total_received: counters.packets_received,
            received_in_window: counters.received_in_window,
            tagged_received: counters.tagged_received,
            untagged_received: counters.untagged_received,
            packet_size,
            window,
            measurement_window_seconds: window_seconds,
            throughput_bps,
            latency: LatencyStats::from_samples(samples),
            drops: counters.drops.clone(),
            complete: true,
        }
    }

    /// Marks the metrics as partial.
    pub fn into_incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn throughput_mbps(&self) -> f64 {
        self.throughput_bps / 1e6
    }


    /// Textual report of counts, throughput, latency, and drops.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        if !self.complete {
            summary.push_str("Status: INCOMPLETE\n");
        }
        summary.push_str(&format!("Packets sent: {}\n", self.total_sent));
        summary.push_str(&format!(
            "Packets received: {} ({} inside the window)\n",
            self.total_received, self.received_in_window
        ));
        if self.untagged_received > 0 {
            summary.push_str(&format!(
                "Untagged arrivals: {} (no delay sample)\n",
                self.untagged_received
            ));
        }
        summary.push_str(&format!(
            "Measurement window: {:.3} s ({} to {})\n",
            self.measurement_window_seconds, self.window.start, self.window.stop
        ));
        summary.push_str(&format!("Throughput: {:.3} Mbps\n", self.throughput_mbps()));

        match &self.latency {
            Some(latency) => {
                summary.push_str(&format!("\nLatency ({} samples):\n", latency.count));
                summary.push_str(&format!("  min: {:?}\n", latency.min));
                summary.push_str(&format!("  mean: {:?}\n", latency.mean));
                summary.push_str(&format!("  max: {:?}\n", latency.max));
                summary.push_str(&format!(
                    "  p50/p95/p99: {:?} / {:?} / {:?}\n",
                    latency.p50, latency.p95, latency.p99
                ));
                summary.push_str(&format!("  stddev: {:?}\n", latency.stddev));
                summary.push_str(&format!("  jitter: {:?}\n", latency.jitter));
            }
            None => summary.push_str("\nLatency: n/a (no tagged packets received)\n"),
        }

        if !self.drops.is_empty() {
            summary.push_str("\nDrops:\n");
            for (reason, count) in &self.drops {
                summary.push_str(&format!("  {reason}: {count}\n"));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample(sent_ms: u64, delay_ms: u64) -> DelaySample {
        DelaySample {
            sent_at: SimTime::from_millis(sent_ms),
            received_at: SimTime::from_millis(sent_ms + delay_ms),
        }
    }

    fn window(start_ms: u64, stop_ms: u64) -> MeasurementWindow {
        MeasurementWindow {
            start: SimTime::from_millis(start_ms),
            stop: SimTime::from_millis(stop_ms),
        }
    }

    #[test]
    fn test_throughput_uses_generator_window() {
        let counters = TrafficCounters {
            packets_sent: 1000,
            packets_received: 1000,
            bytes_received: 1_500_000,
            received_in_window: 1000,
            ..Default::default()
        };

        let metrics = AggregateMetrics::compute(&counters, &[], window(2500, 3500), 1500);

        assert_eq!(metrics.measurement_window_seconds, 1.0);
        assert_eq!(metrics.throughput_bps, 12_000_000.0);
        assert!(metrics.complete);
    }

    #[test]
    fn test_backlog_drained_after_window_is_not_throughput() {
        let counters = TrafficCounters {
            packets_sent: 1000,
            packets_received: 1000,
            received_in_window: 900,
            ..Default::default()
        };

        let metrics = AggregateMetrics::compute(&counters, &[], window(2500, 3500), 1500);

        assert_eq!(metrics.total_received, 1000);
        assert_eq!(metrics.received_in_window, 900);
        assert_eq!(metrics.throughput_bps, 10_800_000.0);
    }

    #[test]
    fn test_window_is_half_open() {
        let window = window(1000, 2000);

        assert!(window.contains(SimTime::from_millis(1000)));
        assert!(window.contains(SimTime::from_nanos(1_999_999_999)));
        assert!(!window.contains(SimTime::from_millis(2000)));
        assert!(!window.contains(SimTime::from_nanos(999_999_999)));
    }

    #[test]
    fn test_json_report_shape() {
        let mut counters = TrafficCounters {
            packets_sent: 4,
            packets_received: 3,
            received_in_window: 3,
            tagged_received: 2,
            untagged_received: 1,
            ..Default::default()
        };
        counters.record_drop(DropReason::RadioQueue);
        let samples = [sample(0, 10), sample(5, 20)];
        let metrics = AggregateMetrics::compute(&counters, &samples, window(0, 1000), 512);

        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json["total_received"], 3);
        assert_eq!(json["untagged_received"], 1);
        assert_eq!(json["drops"]["RadioQueue"], 1);
        assert_eq!(json["window"]["stop"], 1_000_000_000u64);
        assert_eq!(json["latency"]["count"], 2);
        assert_eq!(json["complete"], true);

        let without_latency = AggregateMetrics::compute(&counters, &[], window(0, 1000), 512);
        assert!(serde_json::to_value(&without_latency).unwrap()["latency"].is_null());
    }

    #[test]
    fn test_summary_reports_untagged_arrivals() {
        let counters = TrafficCounters {
            packets_sent: 5,
            packets_received: 5,
            untagged_received: 5,
            ..Default::default()
        };
        let summary = AggregateMetrics::compute(&counters, &[], window(0, 1000), 512).summary();

        assert!(summary.contains("Untagged arrivals: 5"));
    }

    #[test]
    fn test_latency_absent_without_samples() {
        let counters = TrafficCounters {
            packets_sent: 10,
            packets_received: 10,
            ..Default::default()
        };

        let metrics = AggregateMetrics::compute(&counters, &[], window(0, 1000), 512);
        assert!(metrics.latency.is_none());
        assert_eq!(metrics.total_received, 10);
    }

    #[test]
    fn test_latency_statistics() {
        let samples = [sample(0, 10), sample(100, 30), sample(200, 20), sample(300, 40)];
        let stats = LatencyStats::from_samples(&samples).unwrap();

        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(40));
        assert_eq!(stats.mean, Duration::from_millis(25));
        assert_eq!(stats.p50, Duration::from_millis(20));
        assert_eq!(stats.p95, Duration::from_millis(40));
        // |30-10| + |20-30| + |40-20| = 50 over 3 gaps
        assert_eq!(stats.jitter, Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_zero_window_yields_zero_throughput() {
        let counters = TrafficCounters {
            packets_received: 5,
            ..Default::default()
        };
        let metrics = AggregateMetrics::compute(&counters, &[], window(1000, 1000), 512);
        assert_eq!(metrics.throughput_bps, 0.0);
    }

    #[test]
    fn test_drop_accounting() {
        let mut counters = TrafficCounters::default();
        counters.record_drop(DropReason::RadioQueue);
        counters.record_drop(DropReason::RadioQueue);
        counters.record_drop(DropReason::NoRoute);

        assert_eq!(counters.total_dropped(), 3);
        assert_eq!(counters.drops[&DropReason::RadioQueue], 2);
    }

    #[test]
    fn test_incomplete_summary_is_marked() {
        let counters = TrafficCounters {
            packets_sent: 3,
            packets_received: 2,
            ..Default::default()
        };
        let metrics =
            AggregateMetrics::compute(&counters, &[], window(0, 1000), 512).into_incomplete();

        let summary = metrics.summary();
        assert!(summary.starts_with("Status: INCOMPLETE"));
        assert!(summary.contains("Packets received: 2"));
        assert!(summary.contains("Latency: n/a"));
    }

    proptest! {
        #[test]
        fn prop_compute_is_pure(
            received in 0u64..10_000,
            extra_sent in 0u64..1_000,
            delays in proptest::collection::vec(0u64..500, 0..64),
            window_ms in 1u64..10_000,
        ) {
            let counters = TrafficCounters {
                packets_sent: received + extra_sent,
                packets_received: received,
                received_in_window: received,
                bytes_received: received * 1500,
                ..Default::default()
            };
            let samples: Vec<DelaySample> = delays
                .iter()
                .enumerate()
                .map(|(index, delay)| sample(index as u64 * 10, *delay))
                .collect();

            let first = AggregateMetrics::compute(&counters, &samples, window(0, window_ms), 1500);
            let second = AggregateMetrics::compute(&counters, &samples, window(0, window_ms), 1500);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_latency_statistics_are_ordered(
            delays in proptest::collection::vec(0u64..10_000, 1..128),
        ) {
            let samples: Vec<DelaySample> = delays
                .iter()
                .enumerate()
                .map(|(index, delay)| sample(index as u64, *delay))
                .collect();
            let stats = LatencyStats::from_samples(&samples).unwrap();

            prop_assert!(stats.min <= stats.p50);
            prop_assert!(stats.p50 <= stats.p95);
            prop_assert!(stats.p95 <= stats.p99);
            prop_assert!(stats.p99 <= stats.max);
            prop_assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        }
    }
}

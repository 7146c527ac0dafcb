//! Radio access model: per-technology profiles and the downlink scheduler.
//!
//! The model is coarse. Capacity degrades with distance, each
//! packet waits for a TTI boundary after processing, and block errors are
//! recovered by HARQ at the cost of one round trip per retransmission.

use std::time::Duration;

use cellbench_core::metrics::DropReason;
use cellbench_core::{RadioTechnology, SimTime};
use serde::Serialize;

use crate::deterministic::DeterministicRng;

/// Fraction of peak capacity left at the coverage edge.
const CAPACITY_FLOOR: f64 = 0.05;

/// Block error rate reached at the coverage edge.
const EDGE_BLOCK_ERROR_RATE: f64 = 0.5;

/// Radio constants of one technology.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadioProfile {
    /// Radio generation these constants describe
    pub technology: RadioTechnology,
    /// Carrier frequency in Hz
    pub carrier_hz: f64,
    /// Channel bandwidth in Hz
    pub bandwidth_hz: f64,
    /// Downlink capacity next to the base station
    pub peak_capacity_bps: u64,
    /// Transmission time interval
    pub tti: Duration,
    /// eNB/gNB processing before the first transmission opportunity
    pub processing_delay: Duration,
    /// Delay added by each HARQ retransmission
    pub harq_rtt: Duration,
    /// Block error rate next to the base station
    pub base_block_error_rate: f64,
    /// Retransmissions after the first attempt
    pub max_retransmissions: u32,
    /// Furthest distance a terminal may attach from
    pub coverage_radius_m: f64,
    /// Longest a packet may wait for the channel before being dropped
    pub max_queue_delay: Duration,
}

impl RadioProfile {
    /// Returns the constants of `technology`.
    pub fn for_technology(technology: RadioTechnology) -> Self {
        match technology {
            RadioTechnology::WideAreaCellular => Self {
                technology,
                carrier_hz: 2.12e9,
                bandwidth_hz: 20e6,
                peak_capacity_bps: 75_000_000,
                tti: Duration::from_millis(1),
                processing_delay: Duration::from_millis(4),
                harq_rtt: Duration::from_millis(8),
                base_block_error_rate: 0.1,
                max_retransmissions: 3,
                coverage_radius_m: 5_000.0,
                max_queue_delay: Duration::from_millis(50),
            },
            RadioTechnology::ShortRangeHighBand => Self {
                technology,
                carrier_hz: 28e9,
                bandwidth_hz: 400e6,
                peak_capacity_bps: 2_500_000_000,
                tti: Duration::from_micros(125),
                processing_delay: Duration::from_micros(500),
                harq_rtt: Duration::from_millis(1),
                base_block_error_rate: 0.05,
                max_retransmissions: 3,
                coverage_radius_m: 200.0,
                max_queue_delay: Duration::from_millis(10),
            },
        }
    }

    fn distance_ratio(&self, distance_m: f64) -> f64 {
        (distance_m / self.coverage_radius_m).clamp(0.0, 1.0)
    }

    /// Capacity available to a terminal `distance_m` away, capped by the bearer's bit rate.
    pub fn effective_capacity_bps(&self, distance_m: f64, max_bitrate_bps: Option<u64>) -> u64 {
        let ratio = self.distance_ratio(distance_m);
        let scale = (1.0 - ratio * ratio).max(CAPACITY_FLOOR);
        let capacity = ((self.peak_capacity_bps as f64 * scale) as u64).max(1);
        match max_bitrate_bps {
            Some(cap) => capacity.min(cap.max(1)),
            None => capacity,
        }
    }

    /// Per-attempt block error rate at `distance_m`.
    pub fn block_error_rate(&self, distance_m: f64) -> f64 {
        let ratio = self.distance_ratio(distance_m);
        self.base_block_error_rate + (EDGE_BLOCK_ERROR_RATE - self.base_block_error_rate) * ratio
    }

    /// Whether a terminal at `distance_m` is within coverage.
    pub fn covers(&self, distance_m: f64) -> bool {
        distance_m <= self.coverage_radius_m
    }
}

/// Link conditions of one downlink transmission.
#[derive(Debug, Clone, Copy)]
pub struct RadioLinkState {
    /// 3D distance between base station and terminal
    pub distance_m: f64,
    /// Bearer rate cap
    pub max_bitrate_bps: Option<u64>,
}

/// Shared downlink channel of one base station.
#[derive(Debug, Clone)]
pub struct RadioChannel {
    profile: RadioProfile,
    busy_until: SimTime,
}

impl RadioChannel {
    /// Creates an idle channel.
    pub fn new(profile: RadioProfile) -> Self {
        Self {
            profile,
            busy_until: SimTime::ZERO,
        }
    }

    /// Profile this channel runs with.
    pub fn profile(&self) -> &RadioProfile {
        &self.profile
    }

    /// Schedules a `size_bytes` packet that reached the base station at `now`
    /// and returns the time the terminal decodes it.
    ///
    /// # Errors
    ///
    /// - `DropReason::RadioQueue` - The packet would wait longer than the queueing budget
    /// - `DropReason::HarqExhausted` - Every transmission attempt failed
    pub fn transmit(
        &mut self,
        now: SimTime,
        size_bytes: u32,
        link: RadioLinkState,
        rng: &mut DeterministicRng,
    ) -> Result<SimTime, DropReason> {
        let ready = (now + self.profile.processing_delay).align_up(self.profile.tti);
        let start = ready.max(self.busy_until);
        if start - ready > self.profile.max_queue_delay {
            return Err(DropReason::RadioQueue);
        }

        let capacity = self.profile.effective_capacity_bps(link.distance_m, link.max_bitrate_bps);
        let airtime_nanos = (size_bytes as u128 * 8 * 1_000_000_000).div_ceil(capacity as u128);
        let end = start + Duration::from_nanos(airtime_nanos as u64);
        self.busy_until = end;

        let error_rate = self.profile.block_error_rate(link.distance_m);
        for retransmissions in 0..=self.profile.max_retransmissions {
            if !rng.random_bool(error_rate) {
                return Ok(end + self.profile.harq_rtt * retransmissions);
            }
        }
        Err(DropReason::HarqExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near() -> RadioLinkState {
        RadioLinkState {
            distance_m: 10.0,
            max_bitrate_bps: None,
        }
    }

    #[test]
    fn test_capacity_falls_off_with_distance() {
        let profile = RadioProfile::for_technology(RadioTechnology::WideAreaCellular);

        let close = profile.effective_capacity_bps(10.0, None);
        let far = profile.effective_capacity_bps(4_000.0, None);
        let edge = profile.effective_capacity_bps(10_000.0, None);

        assert!(close > far);
        assert!(close <= profile.peak_capacity_bps);
        assert_eq!(edge, (profile.peak_capacity_bps as f64 * CAPACITY_FLOOR) as u64);
        assert_eq!(profile.effective_capacity_bps(10.0, Some(1_000_000)), 1_000_000);
    }

    #[test]
    fn test_block_error_rate_grows_with_distance() {
        let profile = RadioProfile::for_technology(RadioTechnology::ShortRangeHighBand);
        assert_eq!(profile.block_error_rate(0.0), 0.05);
        assert!(profile.block_error_rate(100.0) > profile.block_error_rate(10.0));
        assert!((profile.block_error_rate(200.0) - EDGE_BLOCK_ERROR_RATE).abs() < 1e-12);
    }

    #[test]
    fn test_transmission_waits_for_processing_and_tti() {
        let mut profile = RadioProfile::for_technology(RadioTechnology::WideAreaCellular);
        profile.base_block_error_rate = 0.0;
        let mut channel = RadioChannel::new(profile);
        let mut rng = DeterministicRng::from_seed(1);

        let link = RadioLinkState {
            distance_m: 0.0,
            max_bitrate_bps: None,
        };
        let delivered = channel
            .transmit(SimTime::from_micros(2_300), 1500, link, &mut rng)
            .unwrap();

        // 2.3 ms + 4 ms processing aligned to 7 ms, then 160 us airtime at 75 Mbps
        assert_eq!(delivered, SimTime::from_micros(7_160));
    }

    #[test]
    fn test_saturated_channel_drops_packets() {
        let mut channel =
            RadioChannel::new(RadioProfile::for_technology(RadioTechnology::WideAreaCellular));
        let mut rng = DeterministicRng::from_seed(3);

        let mut dropped = 0;
        for _ in 0..2_000 {
            if channel.transmit(SimTime::ZERO, 1500, near(), &mut rng) == Err(DropReason::RadioQueue)
            {
                dropped += 1;
            }
        }
        assert!(dropped > 0);
    }

    #[test]
    fn test_transmission_is_reproducible_per_seed() {
        let profile = RadioProfile::for_technology(RadioTechnology::ShortRangeHighBand);
        let run = |seed| {
            let mut channel = RadioChannel::new(profile);
            let mut rng = DeterministicRng::from_seed(seed);
            (0..50)
                .map(|index| {
                    channel.transmit(SimTime::from_micros(index * 100), 512, near(), &mut rng)
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(9), run(9));
    }
}

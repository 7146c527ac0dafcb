//! Simulation time.
//!
//! Simulation time is a nanosecond count since the simulation started. It is
//! independent of wall-clock time and only ever moves forward.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::Serialize;

/// Point in simulation time, in nanoseconds since simulation start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates a time from nanoseconds since start.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from microseconds since start.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Creates a time from milliseconds since start.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from fractional seconds since start.
    ///
    /// Negative and non-finite inputs saturate to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1e9).round() as u64)
    }

    /// Nanoseconds since start.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Fractional seconds since start.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Offset from simulation start.
    pub const fn since_start(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later.
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Rounds up to the next multiple of `granularity`.
    ///
    /// Times already on a boundary are returned unchanged.
    pub fn align_up(self, granularity: Duration) -> SimTime {
        let step = duration_nanos(granularity);
        if step == 0 {
            return self;
        }
        let remainder = self.0 % step;
        if remainder == 0 {
            self
        } else {
            SimTime(self.0.saturating_add(step - remainder))
        }
    }
}

/// Whole nanoseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.saturating_since(rhs)
    }
}

impl From<Duration> for SimTime {
    fn from(offset: Duration) -> Self {
        SimTime(duration_nanos(offset))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(SimTime::from_millis(30).as_nanos(), 30_000_000);
        assert_eq!(SimTime::from_micros(10).as_nanos(), 10_000);
        assert_eq!(SimTime::from_secs_f64(2.5), SimTime::from_millis(2500));
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs_f64(f64::NAN), SimTime::ZERO);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let early = SimTime::from_millis(10);
        let late = SimTime::from_millis(25);

        assert_eq!(late - early, Duration::from_millis(15));
        assert_eq!(early - late, Duration::ZERO);
        assert_eq!(early + Duration::from_millis(15), late);
    }

    #[test]
    fn test_huge_durations_saturate_instead_of_wrapping() {
        let start = SimTime::from_secs_f64(2.0);

        assert_eq!(start + Duration::MAX, SimTime::from_nanos(u64::MAX));
        assert_eq!(SimTime::from(Duration::MAX), SimTime::from_nanos(u64::MAX));

        // 2^64 ns + 384 ns: a plain cast would wrap this to a few hundred nanoseconds
        let just_past_u64 = Duration::from_micros(18_446_744_073_709_552);
        assert_eq!(start + just_past_u64, SimTime::from_nanos(u64::MAX));
        assert!(start + just_past_u64 > SimTime::from_secs_f64(3.9));

        assert_eq!(SimTime::from_millis(u64::MAX), SimTime::from_nanos(u64::MAX));
        assert_eq!(
            SimTime::from_nanos(u64::MAX - 1).align_up(Duration::from_nanos(1_000)),
            SimTime::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn test_align_up_to_tti_boundary() {
        let tti = Duration::from_millis(1);

        assert_eq!(SimTime::from_micros(1500).align_up(tti), SimTime::from_millis(2));
        assert_eq!(SimTime::from_millis(3).align_up(tti), SimTime::from_millis(3));
        assert_eq!(SimTime::from_micros(7).align_up(Duration::ZERO), SimTime::from_micros(7));
    }
}

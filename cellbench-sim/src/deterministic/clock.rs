//! Time control and random number generation for deterministic simulations.

use std::time::Duration;

use cellbench_core::SimTime;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::SimulationError;

/// Deterministic clock for simulation time control.
///
/// Time only moves forward and is independent of wall-clock time. Once
/// destroyed the clock refuses to move.
#[derive(Debug, Clone, Default)]
pub struct DeterministicClock {
    current_time: SimTime,
    destroyed: bool,
}

impl DeterministicClock {
    /// Creates new deterministic clock starting at simulation time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Returns elapsed time since simulation start.
    pub fn elapsed(&self) -> Duration {
        self.current_time.since_start()
    }

    /// Advances simulation time to a specific instant.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ClockDestroyed` - Clock was already destroyed
    /// - `SimulationError::InvalidEventScheduling` - Target time is in the past
    pub fn advance_to(&mut self, target: SimTime) -> Result<(), SimulationError> {
        if self.destroyed {
            return Err(SimulationError::ClockDestroyed);
        }
        if target < self.current_time {
            return Err(SimulationError::InvalidEventScheduling {
                reason: format!(
                    "Cannot advance time backwards from {} to {}",
                    self.current_time, target
                ),
            });
        }
        self.current_time = target;
        Ok(())
    }

    /// Releases the clock. Time is frozen afterwards.
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Returns true once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 for fast, seedable pseudorandom numbers.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        // 53 random mantissa bits keep the result strictly below 1.0
        (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generates random boolean with given probability.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random_f64() < probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_clock_advancement() {
        let mut clock = DeterministicClock::new();

        clock.advance_to(SimTime::from_millis(10)).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(10));

        clock.advance_to(SimTime::from_millis(10)).unwrap();
        assert_eq!(clock.now(), SimTime::from_millis(10));
    }

    #[test]
    fn test_clock_cannot_go_backwards() {
        let mut clock = DeterministicClock::new();
        clock.advance_to(SimTime::from_millis(10)).unwrap();

        let result = clock.advance_to(SimTime::from_millis(5));
        assert!(matches!(
            result,
            Err(SimulationError::InvalidEventScheduling { .. })
        ));
    }

    #[test]
    fn test_destroyed_clock_is_frozen() {
        let mut clock = DeterministicClock::new();
        clock.destroy();

        assert!(clock.is_destroyed());
        assert!(matches!(
            clock.advance_to(SimTime::from_millis(1)),
            Err(SimulationError::ClockDestroyed)
        ));
        assert_eq!(clock.now(), SimTime::ZERO);
    }

    #[test]
    fn test_deterministic_rng_reproducibility() {
        let seed = 12345;
        let mut rng1 = DeterministicRng::from_seed(seed);
        let mut rng2 = DeterministicRng::from_seed(seed);

        let values1: Vec<f64> = (0..10).map(|_| rng1.random_f64()).collect();
        let values2: Vec<f64> = (0..10).map(|_| rng2.random_f64()).collect();

        assert_eq!(values1, values2);
        assert_eq!(rng1.seed(), seed);
    }

    #[test]
    fn test_random_f64_bounds() {
        let mut rng = DeterministicRng::from_seed(7);
        for _ in 0..1000 {
            let value = rng.random_f64();
            assert!((0.0..1.0).contains(&value));
        }
        assert!(!rng.random_bool(0.0));
        assert!(rng.random_bool(1.0));
    }
}

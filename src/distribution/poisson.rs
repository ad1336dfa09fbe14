//! Poisson arrival process
//!
//! Inter-arrival gaps of a Poisson process with rate `r` are exponentially
//! distributed with mean `1/r`. Gaps are drawn by inverse-CDF sampling:
//!
//! ```text
//! delay = -ln(max(u, EPSILON)) / r        u ~ Uniform[0, 1)
//! ```
//!
//! The clamp keeps `ln(0)` from producing an infinite delay; the longest
//! possible gap is therefore `-ln(EPSILON) / r`, about `36.7 / r` seconds.
//!
//! Uses the xoshiro256++ PRNG: `next_delay()` runs once per issued call inside
//! the dispatch loop.

use super::{secs_to_duration, validate_rate, ArrivalProcess};
use crate::error::ConfigError;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::Duration;

/// Smallest value such that `1.0 - EPSILON != 1.0`
pub const EPSILON: f64 = f64::EPSILON / 2.0;

/// Exponential delay for a given uniform draw `u` at `rate` calls per second
///
/// Never negative and never infinite for `u` in `[0, 1)` and a positive rate.
#[inline]
pub fn exponential_delay(u: f64, rate: f64) -> Duration {
    let seconds = -u.max(EPSILON).ln() / rate;
    secs_to_duration(seconds.max(0.0))
}

/// Poisson arrivals at a fixed mean rate
pub struct PoissonArrivals {
    rate: f64,
    rng: Xoshiro256PlusPlus,
}

impl PoissonArrivals {
    /// Create a Poisson process with a random seed
    ///
    /// # Errors
    ///
    /// Fails fast on a zero, negative, or non-finite rate.
    pub fn new(rate: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            rate: validate_rate(rate)?,
            rng: Xoshiro256PlusPlus::from_entropy(),
        })
    }

    /// Create a Poisson process with a specific seed
    ///
    /// Useful for reproducible runs and tests.
    pub fn with_seed(rate: f64, seed: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            rate: validate_rate(rate)?,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        })
    }
}

impl ArrivalProcess for PoissonArrivals {
    #[inline(always)]
    fn next_delay(&mut self) -> Duration {
        let u: f64 = self.rng.gen();
        exponential_delay(u, self.rate)
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

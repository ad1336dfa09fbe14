//! Constant-interval arrivals
//!
//! Every gap is exactly `1 / rate`. Not a model of real traffic, but handy to
//! tell scheduler jitter apart from the burstiness of Poisson arrivals.

use super::{secs_to_duration, validate_rate, ArrivalProcess};
use crate::error::ConfigError;
use std::time::Duration;

pub struct ConstantArrivals {
    rate: f64,
    interval: Duration,
}

impl ConstantArrivals {
    pub fn new(rate: f64) -> Result<Self, ConfigError> {
        let rate = validate_rate(rate)?;
        Ok(Self {
            rate,
            interval: secs_to_duration(1.0 / rate),
        })
    }
}

impl ArrivalProcess for ConstantArrivals {
    #[inline(always)]
    fn next_delay(&mut self) -> Duration {
        self.interval
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

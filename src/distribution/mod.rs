//! Inter-arrival distributions
//!
//! An open-loop generator decides when to send each call from an arrival
//! process alone, never from how fast responses come back. This module
//! provides those processes.
//!
//! # Distributions
//!
//! - **Poisson**: exponentially distributed gaps (default; models independent
//!   users)
//! - **Constant**: fixed `1 / rate` gaps (useful to separate scheduler
//!   effects from arrival burstiness)
//!
//! # Example
//!
//! ```
//! use openloop::distribution::{ArrivalProcess, poisson::PoissonArrivals};
//!
//! let mut arrivals = PoissonArrivals::with_seed(1000.0, 7).unwrap();
//! let delay = arrivals.next_delay();
//! assert!(delay.as_secs_f64() < 1.0);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of inter-arrival delays
///
/// Called only from the dispatch loop, so implementations may keep mutable
/// RNG state without synchronization.
pub trait ArrivalProcess: Send {
    /// Delay until the next call should be issued
    fn next_delay(&mut self) -> Duration;

    /// Mean arrival rate in calls per second
    fn rate(&self) -> f64;
}

/// Selectable arrival process kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalKind {
    #[default]
    Poisson,
    Constant,
}

impl std::fmt::Display for ArrivalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrivalKind::Poisson => write!(f, "poisson"),
            ArrivalKind::Constant => write!(f, "constant"),
        }
    }
}

/// Build the arrival process for a run
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRate`] for a non-positive or non-finite rate.
pub fn create_arrival_process(
    kind: ArrivalKind,
    rate: f64,
    seed: Option<u64>,
) -> Result<Box<dyn ArrivalProcess>, ConfigError> {
    Ok(match kind {
        ArrivalKind::Poisson => match seed {
            Some(seed) => Box::new(poisson::PoissonArrivals::with_seed(rate, seed)?),
            None => Box::new(poisson::PoissonArrivals::new(rate)?),
        },
        ArrivalKind::Constant => Box::new(constant::ConstantArrivals::new(rate)?),
    })
}

pub(crate) fn validate_rate(rate: f64) -> Result<f64, ConfigError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidRate(rate))
    }
}

/// Convert seconds to a Duration rounded to the nearest nanosecond
pub(crate) fn secs_to_duration(seconds: f64) -> Duration {
    Duration::from_nanos((seconds * 1_000_000_000.0).round() as u64)
}

pub mod constant;
pub mod poisson;

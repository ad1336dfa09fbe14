//! Fast timing utilities using direct clock_gettime calls
//!
//! The dispatch loop reads the clock millions of times per second while it
//! polls for the next due time, so the clock read has to be as cheap as
//! possible. This module calls `clock_gettime(CLOCK_MONOTONIC)` directly and
//! keeps the result as a plain nanosecond count, which also makes instant
//! arithmetic (due time + delay) a single integer add.

use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Fast timestamp using direct clock_gettime with CLOCK_MONOTONIC
///
/// Resolution: nanosecond. Speed: ~15-20ns per call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FastInstant {
    nanos: u64,
}

impl FastInstant {
    /// Get the current time using CLOCK_MONOTONIC
    #[inline(always)]
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // CLOCK_MONOTONIC is always available; the call cannot fail with a
        // valid timespec pointer.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }

        let nanos = (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64);

        Self { nanos }
    }

    /// Calculate duration since another FastInstant
    ///
    /// Saturates to zero if `earlier` is actually later than `self`.
    #[inline(always)]
    pub fn duration_since(&self, earlier: FastInstant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }

    /// Get elapsed time since this instant
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        Self::now().duration_since(*self)
    }

    /// Whole microseconds elapsed between `earlier` and `self`
    #[inline(always)]
    pub fn micros_since(&self, earlier: FastInstant) -> u64 {
        self.nanos.saturating_sub(earlier.nanos) / 1_000
    }

    #[cfg(test)]
    fn as_nanos(&self) -> u64 {
        self.nanos
    }
}

impl Add<Duration> for FastInstant {
    type Output = FastInstant;

    #[inline(always)]
    fn add(self, rhs: Duration) -> FastInstant {
        let delta = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        FastInstant {
            nanos: self.nanos.saturating_add(delta),
        }
    }
}

impl AddAssign<Duration> for FastInstant {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

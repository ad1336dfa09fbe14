//! Waiting for a due time
//!
//! The dispatch loop must release each call as close as possible to its
//! scheduled instant. OS sleeps overshoot by tens of microseconds, so the
//! default is to busy-poll the clock. The hybrid mode sleeps through most of
//! the gap and spins only for the final `spin_window`.

use crate::util::fast_time::FastInstant;
use std::time::Duration;

/// Waiting discipline used by the dispatch loop and the drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Poll the clock in a tight loop (one core fully busy)
    #[default]
    Spin,
    /// Sleep until `spin_window` before the due time, then spin
    Hybrid { spin_window: Duration },
    /// Sleep only
    Sleep,
}

impl WaitStrategy {
    /// Block the calling thread until `deadline` has passed
    ///
    /// Returns immediately if the deadline is already in the past.
    #[inline]
    pub fn wait_until(&self, deadline: FastInstant) {
        match *self {
            WaitStrategy::Spin => spin_until(deadline),
            WaitStrategy::Hybrid { spin_window } => {
                let remaining = deadline.duration_since(FastInstant::now());
                if remaining > spin_window {
                    std::thread::sleep(remaining - spin_window);
                }
                spin_until(deadline);
            }
            WaitStrategy::Sleep => {
                let remaining = deadline.duration_since(FastInstant::now());
                if !remaining.is_zero() {
                    std::thread::sleep(remaining);
                }
            }
        }
    }

    /// One step of a polling loop that has nothing to wait for but a condition
    ///
    /// Spinning strategies just hint the CPU; sleeping ones back off for
    /// `idle` (bounded by what is left until `deadline`).
    #[inline]
    pub fn pause(&self, idle: Duration, deadline: FastInstant) {
        match *self {
            WaitStrategy::Spin => std::hint::spin_loop(),
            WaitStrategy::Hybrid { .. } | WaitStrategy::Sleep => {
                let remaining = deadline.duration_since(FastInstant::now());
                std::thread::sleep(idle.min(remaining));
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WaitStrategy::Spin => "spin",
            WaitStrategy::Hybrid { .. } => "hybrid",
            WaitStrategy::Sleep => "sleep",
        }
    }
}

#[inline(always)]
fn spin_until(deadline: FastInstant) {
    while FastInstant::now() < deadline {
        std::hint::spin_loop();
    }
}

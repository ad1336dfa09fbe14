//! Call statistics and completion recording
//!
//! Lock-free counters plus the sharded latency histogram, shared between the
//! dispatch loop and every completion callback.
//!
//! Every issued call is represented by a [`Completion`] handle. The handle is
//! created by [`CallStats::begin_call`] at the moment the call is issued and
//! must be resolved exactly once:
//!
//! - [`Completion::succeed`] records the call's latency in the histogram;
//! - [`Completion::fail`] logs the error and counts a failure;
//! - dropping an unresolved handle counts a failure as well.
//!
//! Resolution consumes the handle, so a call can never be counted twice.
//!
//! # Example
//!
//! ```
//! use openloop::stats::CallStats;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(CallStats::new());
//!
//! let ok = stats.begin_call();
//! let bad = stats.begin_call();
//! ok.succeed();
//! bad.fail("connection reset");
//!
//! assert_eq!(stats.issued(), 2);
//! assert_eq!(stats.succeeded(), 1);
//! assert_eq!(stats.failed(), 1);
//! assert_eq!(stats.latency().total_count(), 1);
//! ```

pub mod histogram;

use crate::util::fast_time::FastInstant;
use histogram::{LatencyHistogram, ShardedHistogram};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache-line aligned atomic counter to prevent false sharing
///
/// ```text
/// [value: 8 bytes][padding: 56 bytes] = 64 bytes total
/// ```
///
/// Increments use `Release` and reads use `Acquire`: once the drain observes a
/// settled count, every histogram write made before that settlement is
/// visible to the snapshot that follows.
#[repr(align(64))]
#[derive(Debug)]
pub struct AlignedCounter {
    value: AtomicU64,
    _padding: [u8; 56],
}

impl AlignedCounter {
    /// Create a new counter with initial value 0
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; 56],
        }
    }

    /// Increment the counter by the specified amount
    #[inline]
    pub fn add(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Release);
    }

    /// Get the current value of the counter
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for AlignedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared run statistics
///
/// `issued` is written only by the dispatch loop. `succeeded` and `failed`
/// are written by completion callbacks on arbitrary threads.
#[derive(Debug, Default)]
pub struct CallStats {
    issued: AlignedCounter,
    succeeded: AlignedCounter,
    failed: AlignedCounter,
    latency: ShardedHistogram,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new call as issued and hand back its completion handle
    ///
    /// The issue timestamp is taken here, so callers should invoke this
    /// immediately before handing the call to the transport.
    pub fn begin_call(self: &Arc<Self>) -> Completion {
        let call_id = self.issued.get();
        self.issued.add(1);
        Completion {
            stats: Arc::clone(self),
            call_id,
            issued_at: FastInstant::now(),
            resolved: false,
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.get()
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.get()
    }

    pub fn failed(&self) -> u64 {
        self.failed.get()
    }

    /// Calls that have finished one way or the other
    pub fn settled(&self) -> u64 {
        self.succeeded() + self.failed()
    }

    /// Calls issued but not yet settled
    pub fn outstanding(&self) -> u64 {
        self.issued().saturating_sub(self.settled())
    }

    /// Live concurrent latency histogram
    pub fn latency(&self) -> &ShardedHistogram {
        &self.latency
    }

    /// Merged copy of the latency histogram
    pub fn latency_snapshot(&self) -> LatencyHistogram {
        self.latency.snapshot()
    }

    fn record_success(&self, latency_micros: u64) {
        // Histogram first: the counter bump publishes the sample to the drain.
        self.latency.record_micros(latency_micros);
        self.succeeded.add(1);
    }

    fn record_failure(&self) {
        self.failed.add(1);
    }
}

/// Completion handle for one in-flight call
///
/// Send it wherever the call's outcome becomes known (a transport thread,
/// an async task) and resolve it there.
#[must_use = "dropping a Completion counts the call as failed"]
pub struct Completion {
    stats: Arc<CallStats>,
    call_id: u64,
    issued_at: FastInstant,
    resolved: bool,
}

impl Completion {
    /// Sequence number of this call within the run, starting at 0
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    /// When the call was issued
    pub fn issued_at(&self) -> FastInstant {
        self.issued_at
    }

    /// The call completed successfully: record its latency
    pub fn succeed(mut self) {
        let latency = FastInstant::now().micros_since(self.issued_at);
        self.stats.record_success(latency);
        self.resolved = true;
    }

    /// The call failed: log the error, exclude the call from the histogram
    pub fn fail<E: fmt::Display>(mut self, error: E) {
        tracing::warn!(call_id = self.call_id, error = %error, "call failed");
        self.stats.record_failure();
        self.resolved = true;
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(call_id = self.call_id, "call abandoned without a result");
            self.stats.record_failure();
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("call_id", &self.call_id)
            .field("resolved", &self.resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    #[test]
    fn test_aligned_counter() {
        let counter = AlignedCounter::new();
        counter.add(5);
        counter.add(3);
        assert_eq!(counter.get(), 8);
        assert_eq!(std::mem::size_of::<AlignedCounter>(), 64);
        assert_eq!(std::mem::align_of::<AlignedCounter>(), 64);
    }

    #[test]
    fn test_begin_call_assigns_sequential_ids() {
        let stats = Arc::new(CallStats::new());
        let first = stats.begin_call();
        let second = stats.begin_call();

        assert_eq!(first.call_id(), 0);
        assert_eq!(second.call_id(), 1);
        assert!(second.issued_at() >= first.issued_at());
        assert_eq!(stats.issued(), 2);
        assert_eq!(stats.outstanding(), 2);

        first.succeed();
        second.succeed();
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_success_records_latency() {
        let stats = Arc::new(CallStats::new());
        let completion = stats.begin_call();
        std::thread::sleep(Duration::from_millis(5));
        completion.succeed();

        let snapshot = stats.latency_snapshot();
        assert_eq!(snapshot.total_count(), 1);
        assert!(snapshot.max().unwrap() >= 5_000);
        assert_eq!(stats.succeeded(), 1);
        assert_eq!(stats.failed(), 0);
    }

    #[test]
    fn test_failures_excluded_from_histogram() {
        let stats = Arc::new(CallStats::new());
        for i in 0..10 {
            let completion = stats.begin_call();
            if i % 2 == 0 {
                completion.succeed();
            } else {
                completion.fail("status UNAVAILABLE");
            }
        }

        assert_eq!(stats.succeeded(), 5);
        assert_eq!(stats.failed(), 5);
        assert_eq!(stats.settled(), 10);
        assert_eq!(stats.latency().total_count(), 5);
    }

    #[test]
    fn test_dropped_completion_counts_as_failure() {
        let stats = Arc::new(CallStats::new());
        drop(stats.begin_call());

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.settled(), 1);
        assert_eq!(stats.latency().total_count(), 0);
    }

    #[test]
    fn test_concurrent_completions_no_lost_samples() {
        const CALLS: usize = 10_000;

        let stats = Arc::new(CallStats::new());
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(8)
            .enable_time()
            .build()
            .unwrap();

        let mut rng = rand::thread_rng();
        let mut handles = Vec::with_capacity(CALLS);
        for _ in 0..CALLS {
            let completion = stats.begin_call();
            let delay = Duration::from_micros(rng.gen_range(0..5_000));
            handles.push(runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                completion.succeed();
            }));
        }

        runtime.block_on(async {
            for handle in handles {
                handle.await.unwrap();
            }
        });

        assert_eq!(stats.issued(), CALLS as u64);
        assert_eq!(stats.succeeded(), CALLS as u64);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.latency().total_count(), CALLS as u64);
        assert_eq!(stats.latency_snapshot().total_count(), CALLS as u64);
    }
}

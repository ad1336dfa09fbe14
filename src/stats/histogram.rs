//! Latency histograms using HdrHistogram
//!
//! Two flavors live here:
//!
//! - [`LatencyHistogram`]: a single-owner wrapper around `hdrhistogram::Histogram`
//!   that records microsecond values. Used for snapshots, for the dispatch-lag
//!   histogram (only ever touched by the dispatch loop), and for reporting.
//! - [`ShardedHistogram`]: the concurrent recorder shared by every completion
//!   callback. Each recording thread is pinned to one cache-padded shard, so
//!   completions arriving on different threads never contend; a snapshot
//!   merges all shards.
//!
//! # Example
//!
//! ```
//! use openloop::stats::histogram::ShardedHistogram;
//!
//! let hist = ShardedHistogram::new();
//! hist.record_micros(100);
//! hist.record_micros(200);
//!
//! let snapshot = hist.snapshot();
//! assert_eq!(snapshot.total_count(), 2);
//! assert!(snapshot.value_at_percentile(100.0) >= 200);
//! ```

use crate::Result;
use crossbeam::utils::CachePadded;
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Largest trackable latency in microseconds (60 seconds)
pub const HISTOGRAM_MAX_VALUE: u64 = 60_000_000;

/// Significant decimal digits kept by the histogram
pub const HISTOGRAM_PRECISION: u8 = 3;

/// Latency histogram wrapper
///
/// Values are microseconds, tracked from 1us to [`HISTOGRAM_MAX_VALUE`] with
/// [`HISTOGRAM_PRECISION`] significant digits (0.1% relative error). Values
/// above the maximum are clamped rather than dropped.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new, empty latency histogram
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, HISTOGRAM_MAX_VALUE, HISTOGRAM_PRECISION)
                .expect("histogram bounds are valid constants");

        Self { histogram }
    }

    /// Record one latency sample in microseconds
    #[inline]
    pub fn record_micros(&mut self, micros: u64) {
        self.histogram
            .saturating_record(micros.min(HISTOGRAM_MAX_VALUE));
    }

    /// Value at the given percentile (0.0 - 100.0), in microseconds
    ///
    /// Returns 0 for an empty histogram.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.histogram.value_at_percentile(percentile)
    }

    /// Number of samples recorded
    pub fn total_count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }

    /// Smallest recorded value, or None if empty
    pub fn min(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        Some(self.histogram.min())
    }

    /// Largest recorded value, or None if empty
    pub fn max(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        Some(self.histogram.max())
    }

    /// Mean of recorded values, or None if empty
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.histogram.mean())
    }

    /// Merge another histogram into this one
    ///
    /// # Errors
    ///
    /// Returns an error if the histograms have incompatible configurations.
    pub fn merge(&mut self, other: &LatencyHistogram) -> Result<()> {
        self.histogram
            .add(&other.histogram)
            .map_err(|e| anyhow::anyhow!("Failed to merge histograms: {:?}", e))?;
        Ok(())
    }

    /// Underlying HdrHistogram, for serialization
    pub fn as_hdr(&self) -> &Histogram<u64> {
        &self.histogram
    }

    /// Wrap a histogram read back from a file
    pub fn from_hdr(histogram: Histogram<u64>) -> Self {
        Self { histogram }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    // Assigned round-robin the first time a thread records anything.
    static THREAD_SHARD: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
}

/// Concurrent latency recorder
///
/// Recording takes the mutex of the calling thread's own shard only. With at
/// least as many shards as CPUs, two threads share a shard only when the
/// transport runs more completion threads than there are cores.
#[derive(Debug)]
pub struct ShardedHistogram {
    shards: Box<[CachePadded<Mutex<LatencyHistogram>>]>,
}

impl ShardedHistogram {
    /// One shard per CPU, rounded up to a power of two
    pub fn new() -> Self {
        Self::with_shards(num_cpus::get().max(1).next_power_of_two())
    }

    /// Create a recorder with an explicit shard count (at least 1)
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| CachePadded::new(Mutex::new(LatencyHistogram::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Record one latency sample in microseconds from any thread
    #[inline]
    pub fn record_micros(&self, micros: u64) {
        let idx = THREAD_SHARD.with(|shard| *shard) % self.shards.len();
        lock(&*self.shards[idx]).record_micros(micros);
    }

    /// Total samples across all shards
    pub fn total_count(&self) -> u64 {
        self.shards.iter().map(|shard| lock(&**shard).total_count()).sum()
    }

    /// Merge every shard into a single histogram
    ///
    /// Samples recorded concurrently with the snapshot may or may not be
    /// included; samples recorded before the call started always are.
    pub fn snapshot(&self) -> LatencyHistogram {
        let mut merged = LatencyHistogram::new();
        for shard in self.shards.iter() {
            if let Err(e) = merged.merge(&lock(&**shard)) {
                tracing::error!(error = %e, "dropping histogram shard from snapshot");
            }
        }
        merged
    }
}

impl Default for ShardedHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while recording cannot leave a shard half-written in a way that
// matters for counting, so poisoned shards stay usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

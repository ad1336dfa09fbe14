//! Simulated transport for testing and dry runs
//!
//! Completes every call after a configurable latency without touching the
//! network. Completions run on the transport's own multi-threaded tokio
//! runtime, so they arrive concurrently, out of order, and on threads other
//! than the dispatch loop's, just like a real client library's callbacks.
//!
//! # Features
//!
//! - Fixed latency with optional normally distributed jitter
//! - Random failure injection (`failure_rate`)
//! - Synchronous rejection after N calls (`reject_after`)
//! - Call counting for verification

use super::{completion_runtime, Transport};
use crate::error::{ConfigError, TransportError};
use crate::stats::Completion;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Behavior of a [`SimulatedTransport`]
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Mean time from issue to completion
    pub latency: Duration,

    /// Standard deviation of the latency (0 = fixed latency)
    pub jitter: Duration,

    /// Fraction of calls that complete with an error (0.0 - 1.0)
    pub failure_rate: f64,

    /// Reject every call from this call number onward
    pub reject_after: Option<u64>,

    /// Completion threads (0 = one per CPU)
    pub completion_threads: usize,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            jitter: Duration::ZERO,
            failure_rate: 0.0,
            reject_after: None,
            completion_threads: 0,
        }
    }
}

/// In-process transport with simulated latency
pub struct SimulatedTransport {
    config: SimulatedConfig,
    latency: Normal<f64>,
    accepted: AtomicU64,
    runtime: tokio::runtime::Runtime,
}

impl SimulatedTransport {
    /// Create a simulated transport
    ///
    /// # Errors
    ///
    /// Fails if `failure_rate` is outside 0.0..=1.0 or the completion runtime
    /// cannot be started.
    pub fn new(config: SimulatedConfig) -> Result<Self, TransportError> {
        if !(0.0..=1.0).contains(&config.failure_rate) {
            return Err(TransportError::Setup(
                ConfigError::InvalidFailureRate(config.failure_rate).to_string(),
            ));
        }

        let latency = Normal::new(config.latency.as_secs_f64(), config.jitter.as_secs_f64())
            .map_err(|e| TransportError::Setup(format!("invalid latency jitter: {}", e)))?;
        let runtime = completion_runtime(config.completion_threads, "openloop-sim")?;

        Ok(Self {
            config,
            latency,
            accepted: AtomicU64::new(0),
            runtime,
        })
    }

    /// Number of calls accepted so far (rejected calls are not counted)
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl Transport for SimulatedTransport {
    fn issue(&self, completion: Completion) -> Result<(), TransportError> {
        if let Some(limit) = self.config.reject_after {
            if completion.call_id() >= limit {
                return Err(TransportError::Rejected(format!(
                    "simulated rejection of call {}",
                    completion.call_id()
                )));
            }
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency;
        let jittered = !self.config.jitter.is_zero();
        let fixed = self.config.latency;
        let failure_rate = self.config.failure_rate;

        self.runtime.spawn(async move {
            let (delay, fails) = {
                let mut rng = rand::thread_rng();
                let delay = if jittered {
                    Duration::from_secs_f64(latency.sample(&mut rng).max(0.0))
                } else {
                    fixed
                };
                (delay, failure_rate > 0.0 && rng.gen_bool(failure_rate))
            };

            let deadline = tokio::time::Instant::now() + delay;
            tokio::time::sleep_until(deadline).await;

            if fails {
                completion.fail("simulated failure (status UNAVAILABLE)");
            } else {
                completion.succeed();
            }
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CallStats;
    use std::sync::Arc;

    fn wait_settled(stats: &CallStats, expected: u64) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while stats.settled() < expected && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_completes_after_latency() {
        let transport = SimulatedTransport::new(SimulatedConfig {
            latency: Duration::from_millis(5),
            completion_threads: 2,
            ..SimulatedConfig::default()
        })
        .unwrap();
        let stats = Arc::new(CallStats::new());

        for _ in 0..20 {
            transport.issue(stats.begin_call()).unwrap();
        }
        wait_settled(&stats, 20);

        assert_eq!(transport.accepted_count(), 20);
        assert_eq!(stats.succeeded(), 20);
        let snapshot = stats.latency_snapshot();
        assert!(snapshot.min().unwrap() >= 5_000);
    }

    #[test]
    fn test_issue_does_not_block() {
        let transport = SimulatedTransport::new(SimulatedConfig {
            latency: Duration::from_millis(200),
            completion_threads: 1,
            ..SimulatedConfig::default()
        })
        .unwrap();
        let stats = Arc::new(CallStats::new());

        let start = std::time::Instant::now();
        for _ in 0..100 {
            transport.issue(stats.begin_call()).unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(stats.settled(), 0);
    }

    #[test]
    fn test_all_calls_fail_at_full_failure_rate() {
        let transport = SimulatedTransport::new(SimulatedConfig {
            latency: Duration::from_millis(1),
            failure_rate: 1.0,
            completion_threads: 2,
            ..SimulatedConfig::default()
        })
        .unwrap();
        let stats = Arc::new(CallStats::new());

        for _ in 0..10 {
            transport.issue(stats.begin_call()).unwrap();
        }
        wait_settled(&stats, 10);

        assert_eq!(stats.failed(), 10);
        assert_eq!(stats.latency().total_count(), 0);
    }

    #[test]
    fn test_rejects_after_limit() {
        let transport = SimulatedTransport::new(SimulatedConfig {
            latency: Duration::from_millis(1),
            reject_after: Some(3),
            completion_threads: 1,
            ..SimulatedConfig::default()
        })
        .unwrap();
        let stats = Arc::new(CallStats::new());

        for _ in 0..3 {
            transport.issue(stats.begin_call()).unwrap();
        }
        let err = transport.issue(stats.begin_call()).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(transport.accepted_count(), 3);
    }

    #[test]
    fn test_jitter_spreads_latency() {
        let transport = SimulatedTransport::new(SimulatedConfig {
            latency: Duration::from_millis(20),
            jitter: Duration::from_millis(5),
            completion_threads: 2,
            ..SimulatedConfig::default()
        })
        .unwrap();
        let stats = Arc::new(CallStats::new());

        for _ in 0..200 {
            transport.issue(stats.begin_call()).unwrap();
        }
        wait_settled(&stats, 200);

        let snapshot = stats.latency_snapshot();
        assert_eq!(snapshot.total_count(), 200);
        assert!(snapshot.max().unwrap() - snapshot.min().unwrap() > 5_000);
    }

    #[test]
    fn test_invalid_failure_rate() {
        let result = SimulatedTransport::new(SimulatedConfig {
            failure_rate: 1.5,
            ..SimulatedConfig::default()
        });
        assert!(result.is_err());
    }
}

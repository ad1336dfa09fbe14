//! Open-loop load generation worker
//!
//! This module implements the [`LoadGenerationWorker`], the core execution
//! unit. It issues calls at the times dictated by an arrival process, never
//! waiting for a response before issuing the next call, and afterwards waits
//! a bounded time for the calls still in flight.
//!
//! # Architecture
//!
//! The worker orchestrates these pieces:
//! - **ArrivalProcess**: produces inter-arrival delays
//! - **WaitStrategy**: how the dispatch loop waits for the next due time
//! - **Transport**: starts each call and resolves its completion later
//! - **CallStats**: counters and the sharded latency histogram written by
//!   completions on arbitrary threads
//!
//! # Lifecycle
//!
//! ```text
//! ISSUING ──(all calls issued, or transport rejection)──> DRAINING
//! DRAINING ──(every issued call settled, or drain timeout)──> DONE
//! ```
//!
//! The dispatch loop runs on the thread that calls [`LoadGenerationWorker::run`]
//! and keeps one core busy while it polls the clock (unless a sleeping
//! [`WaitStrategy`] is selected).
//!
//! # Example
//!
//! ```no_run
//! use openloop::config::RunParameters;
//! use openloop::transport::simulated::{SimulatedConfig, SimulatedTransport};
//! use std::sync::Arc;
//!
//! let params = RunParameters::new(100.0, 2)?;
//! let transport = Arc::new(SimulatedTransport::new(SimulatedConfig::default())?);
//!
//! let result = openloop::worker::run(params, transport)?;
//! println!("p99 = {}us", result.value_at_percentile(99.0));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod pacing;

use crate::config::{RunConfig, RunParameters};
use crate::distribution::{create_arrival_process, ArrivalKind, ArrivalProcess};
use crate::error::{ConfigError, RunError, TransportError};
use crate::stats::histogram::LatencyHistogram;
use crate::stats::CallStats;
use crate::transport::Transport;
use crate::util::fast_time::FastInstant;
use crate::util::time::calculate_qps;
use pacing::WaitStrategy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on how long the drain waits for outstanding calls
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Percentiles printed in every report
pub const REPORT_PERCENTILES: [f64; 6] = [50.0, 90.0, 95.0, 99.0, 99.9, 100.0];

/// Back-off between drain polls for sleeping wait strategies
const DRAIN_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Constructed, nothing issued yet
    Ready,
    /// Dispatch loop is issuing calls
    Issuing,
    /// Waiting for outstanding calls
    Draining,
    /// Result collected
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Ready => "ready",
            RunPhase::Issuing => "issuing",
            RunPhase::Draining => "draining",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one run
///
/// Produced exactly once, after the drain. The histograms are snapshots:
/// completions that land later do not change them.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Latencies of successful calls, in microseconds
    pub histogram: LatencyHistogram,
    /// Wall time from the first due instant to the end of the drain
    pub elapsed: Duration,
    /// Calls handed to the transport (including a rejected one)
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Whether every issued call settled before the drain timeout
    pub drained: bool,
    /// How late each call left relative to its scheduled time, in microseconds
    pub dispatch_lag: LatencyHistogram,
    pub target_qps: f64,
}

impl RunResult {
    /// Number of latency samples (successful calls)
    pub fn total_count(&self) -> u64 {
        self.histogram.total_count()
    }

    /// Latency at `percentile` in microseconds (0 when nothing succeeded)
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.histogram.value_at_percentile(percentile)
    }

    /// `(percentile, micros)` for each of [`REPORT_PERCENTILES`]
    pub fn percentiles(&self) -> Vec<(f64, u64)> {
        REPORT_PERCENTILES
            .iter()
            .map(|&p| (p, self.value_at_percentile(p)))
            .collect()
    }

    /// Successful calls per second of elapsed time
    pub fn actual_qps(&self) -> f64 {
        calculate_qps(self.total_count(), self.elapsed)
    }

    /// Calls still unsettled when the result was taken
    pub fn outstanding(&self) -> u64 {
        self.issued.saturating_sub(self.succeeded + self.failed)
    }

    /// True when the drain saw every issued call settle
    pub fn is_complete(&self) -> bool {
        self.drained
    }
}

/// Open-loop load generation worker
///
/// Owns the arrival process and the dispatch loop. The transport and the
/// call statistics are shared with the transport's completion threads.
pub struct LoadGenerationWorker {
    params: RunParameters,
    arrivals: Box<dyn ArrivalProcess>,
    transport: Arc<dyn Transport>,
    wait: WaitStrategy,
    drain_timeout: Duration,
    stats: Arc<CallStats>,
    dispatch_lag: LatencyHistogram,
    phase: RunPhase,
}

impl LoadGenerationWorker {
    /// Create a worker from explicit parts
    pub fn new(
        params: RunParameters,
        arrivals: Box<dyn ArrivalProcess>,
        transport: Arc<dyn Transport>,
        wait: WaitStrategy,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            params,
            arrivals,
            transport,
            wait,
            drain_timeout,
            stats: Arc::new(CallStats::new()),
            dispatch_lag: LatencyHistogram::new(),
            phase: RunPhase::Ready,
        }
    }

    /// Create a worker for a configured run
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the rate or duration is invalid.
    pub fn from_config(run: &RunConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        let params = run.parameters()?;
        let arrivals = create_arrival_process(run.arrival, params.target_qps(), run.seed)?;
        Ok(Self::new(
            params,
            arrivals,
            transport,
            run.wait_strategy(),
            run.drain_timeout(),
        ))
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Live statistics, shared with the completion threads
    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }

    /// Execute the run: issue, drain, collect
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Issue`] if the transport rejects a call. Issuing
    /// stops at that call, the drain still runs, and the error carries the
    /// partial result.
    pub fn run(mut self) -> Result<RunResult, RunError> {
        tracing::info!(
            params = %self.params,
            transport = self.transport.name(),
            wait = self.wait.name(),
            "starting run"
        );

        let start = FastInstant::now();
        let issue_result = self.issue_calls(start);
        let issuing_time = start.elapsed();
        tracing::debug!(
            issued = self.stats.issued(),
            issuing_time = ?issuing_time,
            "issuing finished"
        );

        let drained = self.await_completion(self.drain_timeout);
        if !drained {
            tracing::warn!(
                outstanding = self.stats.outstanding(),
                timeout = ?self.drain_timeout,
                "drain timed out with calls still in flight"
            );
        }
        let elapsed = start.elapsed();

        let result = self.collect(elapsed, drained);
        match issue_result {
            Ok(()) => Ok(result),
            Err(source) => Err(RunError::Issue {
                source,
                partial: Box::new(result),
            }),
        }
    }

    /// Dispatch loop: issue exactly `total_calls` calls at their due times
    ///
    /// `next_due` starts at `start` and advances by one arrival delay per
    /// call. The issue timestamp is taken when the call is handed to the
    /// transport, after waiting, so scheduling overhead never shrinks the
    /// measured latency.
    fn issue_calls(&mut self, start: FastInstant) -> Result<(), TransportError> {
        self.set_phase(RunPhase::Issuing);

        let total_calls = self.params.total_calls();
        let mut next_due = start;
        let mut issued = 0u64;

        while issued < total_calls {
            self.wait.wait_until(next_due);

            let due = next_due;
            next_due += self.arrivals.next_delay();

            let completion = self.stats.begin_call();
            self.dispatch_lag
                .record_micros(completion.issued_at().micros_since(due));
            issued += 1;

            if let Err(e) = self.transport.issue(completion) {
                tracing::error!(issued, error = %e, "transport rejected call, stopping dispatch");
                return Err(e);
            }
        }

        Ok(())
    }

    /// Wait until every issued call has settled or `max_wait` has elapsed
    ///
    /// Returns `true` if everything settled. Polls with the run's wait
    /// strategy, so with the default spin strategy this keeps a core busy.
    pub fn await_completion(&mut self, max_wait: Duration) -> bool {
        self.set_phase(RunPhase::Draining);

        let deadline = FastInstant::now() + max_wait;
        loop {
            if self.stats.settled() >= self.stats.issued() {
                return true;
            }
            if FastInstant::now() >= deadline {
                return false;
            }
            self.wait.pause(DRAIN_POLL_INTERVAL, deadline);
        }
    }

    fn collect(&mut self, elapsed: Duration, drained: bool) -> RunResult {
        self.set_phase(RunPhase::Done);

        // Counters before the histogram: succeeded never exceeds the sample
        // count seen in the snapshot.
        let succeeded = self.stats.succeeded();
        let failed = self.stats.failed();
        let issued = self.stats.issued();
        let histogram = self.stats.latency_snapshot();

        RunResult {
            histogram,
            elapsed,
            issued,
            succeeded,
            failed,
            drained,
            dispatch_lag: std::mem::take(&mut self.dispatch_lag),
            target_qps: self.params.target_qps(),
        }
    }

    fn set_phase(&mut self, phase: RunPhase) {
        tracing::trace!(from = %self.phase, to = %phase, "run phase change");
        self.phase = phase;
    }
}

/// Run with Poisson arrivals, spin waiting and the default drain timeout
///
/// # Errors
///
/// See [`LoadGenerationWorker::run`].
pub fn run(params: RunParameters, transport: Arc<dyn Transport>) -> Result<RunResult, RunError> {
    let arrivals = create_arrival_process(ArrivalKind::Poisson, params.target_qps(), None)?;
    LoadGenerationWorker::new(
        params,
        arrivals,
        transport,
        WaitStrategy::Spin,
        DEFAULT_DRAIN_TIMEOUT,
    )
    .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::constant::ConstantArrivals;
    use crate::distribution::poisson::PoissonArrivals;
    use crate::stats::Completion;
    use crate::transport::simulated::{SimulatedConfig, SimulatedTransport};
    use std::sync::Mutex;

    /// Completes every call synchronously inside `issue`
    struct ImmediateTransport {
        fail_every: Option<u64>,
    }

    impl Transport for ImmediateTransport {
        fn issue(&self, completion: Completion) -> Result<(), TransportError> {
            match self.fail_every {
                Some(n) if completion.call_id() % n == 0 => completion.fail("injected"),
                _ => completion.succeed(),
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "immediate"
        }
    }

    /// Accepts calls and never completes them
    #[derive(Default)]
    struct StuckTransport {
        held: Mutex<Vec<Completion>>,
    }

    impl Transport for StuckTransport {
        fn issue(&self, completion: Completion) -> Result<(), TransportError> {
            self.held.lock().unwrap().push(completion);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    fn fast_worker(rate: f64, secs: u64, transport: Arc<dyn Transport>) -> LoadGenerationWorker {
        LoadGenerationWorker::new(
            RunParameters::new(rate, secs).unwrap(),
            Box::new(PoissonArrivals::with_seed(rate, 11).unwrap()),
            transport,
            WaitStrategy::Spin,
            DEFAULT_DRAIN_TIMEOUT,
        )
    }

    #[test]
    fn test_issues_exact_call_count() {
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let result = fast_worker(2_500.5, 1, transport).run().unwrap();

        assert_eq!(result.issued, 2_500);
        assert_eq!(result.succeeded, 2_500);
        assert_eq!(result.total_count(), 2_500);
        assert!(result.is_complete());
    }

    #[test]
    fn test_run_with_no_calls() {
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let worker = fast_worker(0.5, 1, transport);
        assert_eq!(worker.params().total_calls(), 0);

        let result = worker.run().unwrap();
        assert_eq!(result.issued, 0);
        assert_eq!(result.total_count(), 0);
        assert!(result.is_complete());
        assert_eq!(result.actual_qps(), 0.0);
        assert_eq!(result.value_at_percentile(50.0), 0);
    }

    #[test]
    fn test_hybrid_wait_issues_and_drains() {
        let transport = Arc::new(
            SimulatedTransport::new(SimulatedConfig {
                latency: Duration::from_millis(2),
                completion_threads: 2,
                ..SimulatedConfig::default()
            })
            .unwrap(),
        );
        let worker = LoadGenerationWorker::new(
            RunParameters::new(200.0, 1).unwrap(),
            Box::new(ConstantArrivals::new(200.0).unwrap()),
            transport,
            WaitStrategy::Hybrid {
                spin_window: Duration::from_micros(200),
            },
            DEFAULT_DRAIN_TIMEOUT,
        );

        let result = worker.run().unwrap();
        assert_eq!(result.issued, 200);
        assert_eq!(result.succeeded, 200);
        assert!(result.is_complete());
        assert!(
            result.elapsed < Duration::from_millis(1_500),
            "elapsed = {:?}",
            result.elapsed
        );

        let lag_p50 = result.dispatch_lag.value_at_percentile(50.0);
        assert!(lag_p50 < 2_000, "dispatch lag p50 = {}us", lag_p50);
    }

    #[test]
    fn test_failed_calls_excluded_from_histogram() {
        let transport = Arc::new(ImmediateTransport { fail_every: Some(4) });
        let result = fast_worker(1_000.0, 1, transport).run().unwrap();

        assert_eq!(result.issued, 1_000);
        assert_eq!(result.failed, 250);
        assert_eq!(result.succeeded, 750);
        assert_eq!(result.total_count(), 750);
        assert!(result.is_complete());
    }

    #[test]
    fn test_drain_returns_promptly_when_settled() {
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let mut worker = fast_worker(10.0, 1, transport);
        worker.issue_calls(FastInstant::now()).unwrap();

        let start = FastInstant::now();
        assert!(worker.await_completion(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(worker.phase(), RunPhase::Draining);
    }

    #[test]
    fn test_drain_times_out_on_stuck_calls() {
        let transport = Arc::new(StuckTransport::default());
        let mut worker = LoadGenerationWorker::new(
            RunParameters::new(1_000.0, 1).unwrap(),
            Box::new(ConstantArrivals::new(1_000.0).unwrap()),
            transport.clone(),
            WaitStrategy::Spin,
            Duration::from_millis(200),
        );
        let stats = worker.stats();

        worker.issue_calls(FastInstant::now()).unwrap();
        assert_eq!(stats.issued(), 1_000);
        assert_eq!(stats.outstanding(), 1_000);

        let start = FastInstant::now();
        assert!(!worker.await_completion(Duration::from_millis(200)));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(400));

        // Releasing the held handles settles the calls as failures
        transport.held.lock().unwrap().clear();
        assert_eq!(stats.failed(), 1_000);
        assert!(worker.await_completion(Duration::from_millis(10)));
    }

    #[test]
    fn test_incomplete_run_reports_outstanding() {
        let transport = Arc::new(StuckTransport::default());
        let worker = LoadGenerationWorker::new(
            RunParameters::new(50.0, 1).unwrap(),
            Box::new(ConstantArrivals::new(50.0).unwrap()),
            transport,
            WaitStrategy::Sleep,
            Duration::from_millis(50),
        );

        let result = worker.run().unwrap();
        assert_eq!(result.issued, 50);
        assert!(!result.is_complete());
        assert_eq!(result.outstanding(), 50);
        assert_eq!(result.total_count(), 0);
        assert_eq!(result.value_at_percentile(99.0), 0);
    }

    #[test]
    fn test_rejection_aborts_with_partial_result() {
        let transport = Arc::new(
            SimulatedTransport::new(SimulatedConfig {
                latency: Duration::from_millis(1),
                reject_after: Some(20),
                completion_threads: 2,
                ..SimulatedConfig::default()
            })
            .unwrap(),
        );

        let err = fast_worker(1_000.0, 1, transport).run().unwrap_err();
        assert!(matches!(err, RunError::Issue { source: TransportError::Rejected(_), .. }));

        let partial = err.partial_result().unwrap();
        assert_eq!(partial.issued, 21);
        assert_eq!(partial.succeeded, 20);
        assert_eq!(partial.failed, 1);
        assert_eq!(partial.total_count(), 20);
        assert!(partial.is_complete());
    }

    #[test]
    fn test_end_to_end_constant_rate() {
        let transport = Arc::new(
            SimulatedTransport::new(SimulatedConfig {
                latency: Duration::from_millis(10),
                completion_threads: 2,
                ..SimulatedConfig::default()
            })
            .unwrap(),
        );
        let worker = LoadGenerationWorker::new(
            RunParameters::new(100.0, 2).unwrap(),
            Box::new(ConstantArrivals::new(100.0).unwrap()),
            transport,
            WaitStrategy::Spin,
            DEFAULT_DRAIN_TIMEOUT,
        );

        let result = worker.run().unwrap();
        assert_eq!(result.total_count(), 200);
        assert!(result.is_complete());

        let p50 = result.value_at_percentile(50.0);
        let p99 = result.value_at_percentile(99.0);
        let max = result.value_at_percentile(100.0);
        assert!((10_000..13_000).contains(&p50), "p50 = {}", p50);
        assert!((10_000..20_000).contains(&p99), "p99 = {}", p99);
        assert!(max < 30_000, "max = {}", max);

        let qps = result.actual_qps();
        assert!((90.0..=101.0).contains(&qps), "qps = {}", qps);
        assert_eq!(result.target_qps, 100.0);
    }

    #[test]
    fn test_end_to_end_poisson() {
        let transport = Arc::new(
            SimulatedTransport::new(SimulatedConfig {
                latency: Duration::from_millis(10),
                completion_threads: 2,
                ..SimulatedConfig::default()
            })
            .unwrap(),
        );

        let result = run(RunParameters::new(100.0, 2).unwrap(), transport).unwrap();
        assert_eq!(result.issued, 200);
        assert_eq!(result.total_count(), 200);

        // Poisson gaps make the issuing time itself random: 200 draws put
        // the 3-sigma band around 2s at roughly +/-0.45s.
        let qps = result.actual_qps();
        assert!((70.0..=150.0).contains(&qps), "qps = {}", qps);
        assert!(result.value_at_percentile(50.0) >= 10_000);
    }

    #[test]
    fn test_dispatch_lag_recorded_per_call() {
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let result = fast_worker(500.0, 1, transport).run().unwrap();

        assert_eq!(result.dispatch_lag.total_count(), 500);
        // Spinning keeps the loop within a fraction of a millisecond of schedule
        assert!(result.dispatch_lag.value_at_percentile(50.0) < 1_000);
    }

    #[test]
    fn test_percentiles_listing() {
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let result = fast_worker(100.0, 1, transport).run().unwrap();

        let percentiles = result.percentiles();
        assert_eq!(percentiles.len(), REPORT_PERCENTILES.len());
        assert_eq!(percentiles[0].0, 50.0);
        assert_eq!(percentiles[5].0, 100.0);
        assert!(percentiles.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_from_config() {
        let run = RunConfig {
            target_qps: 20.0,
            duration_secs: 1,
            arrival: ArrivalKind::Constant,
            ..RunConfig::default()
        };
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        let worker = LoadGenerationWorker::from_config(&run, transport).unwrap();
        assert_eq!(worker.params().total_calls(), 20);
        assert_eq!(worker.phase(), RunPhase::Ready);

        let bad = RunConfig {
            target_qps: -1.0,
            ..RunConfig::default()
        };
        let transport = Arc::new(ImmediateTransport { fail_every: None });
        assert!(LoadGenerationWorker::from_config(&bad, transport).is_err());
    }
}

//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! A configuration file mirrors the sections below; every field except the
//! run's rate and duration has a default:
//!
//! ```toml
//! [run]
//! target_qps = 1000.0
//! duration_secs = 30
//! drain_timeout_ms = 1000
//! arrival = "poisson"
//! wait = "spin"
//!
//! [transport]
//! kind = "tcp"
//! host = "10.0.0.5"
//! port = 9999
//! client_payload = 64
//! server_payload = 64
//!
//! [output]
//! save_histogram = "latency.hgrm"
//! ```

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::distribution::ArrivalKind;
use crate::error::ConfigError;
use crate::transport::TransportKind;
use crate::worker::pacing::WaitStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Load shape and termination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Mean arrival rate in calls per second
    pub target_qps: f64,
    /// Issuing phase length in seconds
    pub duration_secs: u64,
    /// Longest wait for outstanding calls after issuing ends
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Inter-arrival distribution
    #[serde(default)]
    pub arrival: ArrivalKind,
    /// Fixed RNG seed for reproducible schedules
    #[serde(default)]
    pub seed: Option<u64>,
    /// How the dispatch loop waits for the next due time
    #[serde(default)]
    pub wait: WaitMode,
    /// Spin window for hybrid waiting, in microseconds
    #[serde(default = "default_spin_window_us")]
    pub spin_window_us: u64,
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

fn default_spin_window_us() -> u64 {
    200
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_qps: 100.0,
            duration_secs: 10,
            drain_timeout_ms: default_drain_timeout_ms(),
            arrival: ArrivalKind::default(),
            seed: None,
            wait: WaitMode::default(),
            spin_window_us: default_spin_window_us(),
        }
    }
}

impl RunConfig {
    /// Validated rate and duration
    pub fn parameters(&self) -> Result<RunParameters, ConfigError> {
        RunParameters::new(self.target_qps, self.duration_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn wait_strategy(&self) -> WaitStrategy {
        match self.wait {
            WaitMode::Spin => WaitStrategy::Spin,
            WaitMode::Hybrid => WaitStrategy::Hybrid {
                spin_window: Duration::from_micros(self.spin_window_us),
            },
            WaitMode::Sleep => WaitStrategy::Sleep,
        }
    }
}

/// Waiting discipline of the dispatch loop and drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Busy-poll the clock (most precise, burns one core)
    #[default]
    Spin,
    /// Sleep until shortly before the due time, then spin
    Hybrid,
    /// Sleep only (cheap, tens of microseconds of error)
    Sleep,
}

/// Transport selection and its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Peer host (tcp)
    #[serde(default = "default_host")]
    pub host: String,
    /// Peer port (tcp)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request payload size in bytes
    #[serde(default)]
    pub client_payload: usize,
    /// Response payload size requested from the server, in bytes
    #[serde(default)]
    pub server_payload: usize,
    /// Simulated call latency in microseconds (simulated)
    #[serde(default = "default_simulated_latency_us")]
    pub simulated_latency_us: u64,
    /// Standard deviation of the simulated latency in microseconds (simulated)
    #[serde(default)]
    pub simulated_jitter_us: u64,
    /// Fraction of simulated calls that fail (simulated)
    #[serde(default)]
    pub failure_rate: f64,
    /// Threads running completions (0 = one per CPU)
    #[serde(default)]
    pub completion_threads: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_simulated_latency_us() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            client_payload: 0,
            server_payload: 0,
            simulated_latency_us: default_simulated_latency_us(),
            simulated_jitter_us: 0,
            failure_rate: 0.0,
            completion_threads: 0,
        }
    }
}

/// Result destinations beyond the console report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// HdrHistogram V2 file with the latency distribution
    #[serde(default)]
    pub save_histogram: Option<PathBuf>,
    /// JSON summary
    #[serde(default)]
    pub json_output: Option<PathBuf>,
}

/// Immutable rate and duration of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    target_qps: f64,
    duration_secs: u64,
}

impl RunParameters {
    /// # Errors
    ///
    /// Rejects a non-positive or non-finite rate and a zero duration. A
    /// rate so low that `total_calls` floors to 0 is a valid, empty run.
    pub fn new(target_qps: f64, duration_secs: u64) -> Result<Self, ConfigError> {
        if !(target_qps.is_finite() && target_qps > 0.0) {
            return Err(ConfigError::InvalidRate(target_qps));
        }
        if duration_secs == 0 {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(Self {
            target_qps,
            duration_secs,
        })
    }

    pub fn target_qps(&self) -> f64 {
        self.target_qps
    }

    /// `floor(target_qps * duration_secs)`
    pub fn total_calls(&self) -> u64 {
        (self.target_qps * self.duration_secs as f64).floor() as u64
    }
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls/s for {}s ({} calls)",
            self.target_qps,
            self.duration_secs,
            self.total_calls()
        )
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportKind::Simulated => {
                write!(f, "simulated, latency={}us", self.simulated_latency_us)?;
                if self.simulated_jitter_us > 0 {
                    write!(f, " +/- {}us", self.simulated_jitter_us)?;
                }
                if self.failure_rate > 0.0 {
                    write!(f, ", failure_rate={}", self.failure_rate)?;
                }
                Ok(())
            }
            TransportKind::Tcp => write!(
                f,
                "tcp {}:{}, request={}B, response={}B",
                self.host, self.port, self.client_payload, self.server_payload
            ),
        }
    }
}

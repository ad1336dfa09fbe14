//! Error types shared across the load generator

use crate::worker::RunResult;
use thiserror::Error;

/// Invalid run configuration. Always detected before any call is issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("target rate must be a positive finite number of calls per second, got {0}")]
    InvalidRate(f64),

    #[error("duration must be at least 1 second")]
    ZeroDuration,

    #[error("failure rate must be within 0.0..=1.0, got {0}")]
    InvalidFailureRate(f64),
}

/// Failure raised by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused to start a call at all
    #[error("call rejected by transport: {0}")]
    Rejected(String),

    /// The transport could not be brought up
    #[error("failed to set up transport: {0}")]
    Setup(String),
}

/// Run-level failure
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Issuing stopped early. `partial` holds what was measured for the calls
    /// that did go out.
    #[error("run aborted after {} issued calls: {source}", .partial.issued)]
    Issue {
        #[source]
        source: TransportError,
        partial: Box<RunResult>,
    },
}

impl RunError {
    /// Partial measurements, if the run got far enough to produce any
    pub fn partial_result(&self) -> Option<&RunResult> {
        match self {
            RunError::Config(_) => None,
            RunError::Issue { partial, .. } => Some(partial),
        }
    }
}

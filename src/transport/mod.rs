//! Transport abstraction
//!
//! The load generator never speaks a wire protocol itself. It only needs to
//! hand a call to something that will start it without blocking and report
//! back exactly once when it finishes. That something is a [`Transport`].
//!
//! # Contract
//!
//! - [`Transport::issue`] must return promptly. It may not wait for the
//!   call's response.
//! - The [`Completion`] passed in must be resolved exactly once, from any
//!   thread: `succeed()` on success, `fail(err)` on error. Dropping it
//!   unresolved counts the call as failed.
//! - Returning `Err` means the call could not even be started. The dispatch
//!   loop treats this as fatal for the whole run.
//!
//! # Transports
//!
//! - **Simulated**: completes calls after a configurable latency on an
//!   internal tokio runtime, with optional jitter, failure injection and
//!   rejection injection. No network involved.
//! - **TCP**: one connection per call to a peer running `openloop --mode server`,
//!   using a small length-prefixed request/response framing.
//!
//! # Example
//!
//! ```
//! use openloop::stats::CallStats;
//! use openloop::transport::Transport;
//! use openloop::transport::simulated::{SimulatedConfig, SimulatedTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = SimulatedTransport::new(SimulatedConfig {
//!     latency: Duration::from_millis(1),
//!     ..SimulatedConfig::default()
//! })?;
//!
//! let stats = Arc::new(CallStats::new());
//! transport.issue(stats.begin_call())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod simulated;
pub mod tcp;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::stats::Completion;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Asynchronous call issuer
///
/// Transports are shared between the dispatch loop and their own completion
/// threads, hence `Send + Sync`.
pub trait Transport: Send + Sync {
    /// Start one call without waiting for its result
    ///
    /// # Errors
    ///
    /// Returns an error only if the call could not be started at all.
    fn issue(&self, completion: Completion) -> Result<(), TransportError>;

    /// Short name for logs and reports
    fn name(&self) -> &'static str;
}

/// Selectable transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Simulated,
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Simulated => write!(f, "simulated"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Build the transport described by the configuration
pub fn create_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let transport: Arc<dyn Transport> = match config.kind {
        TransportKind::Simulated => Arc::new(simulated::SimulatedTransport::new(
            simulated::SimulatedConfig {
                latency: Duration::from_micros(config.simulated_latency_us),
                jitter: Duration::from_micros(config.simulated_jitter_us),
                failure_rate: config.failure_rate,
                reject_after: None,
                completion_threads: config.completion_threads,
            },
        )?),
        TransportKind::Tcp => Arc::new(tcp::TcpTransport::connect(
            &config.host,
            config.port,
            config.client_payload,
            config.server_payload,
            config.completion_threads,
        )?),
    };

    tracing::debug!(transport = transport.name(), "transport ready");
    Ok(transport)
}

/// Multi-threaded runtime that runs a transport's completions
pub(crate) fn completion_runtime(
    threads: usize,
    name: &str,
) -> Result<tokio::runtime::Runtime, TransportError> {
    let threads = if threads == 0 { num_cpus::get().max(1) } else { threads };
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name(name)
        .enable_all()
        .build()
        .map_err(|e| TransportError::Setup(format!("failed to start completion runtime: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_simulated_transport() {
        let config = TransportConfig::default();
        let transport = create_transport(&config).unwrap();
        assert_eq!(transport.name(), "simulated");
    }

    #[test]
    fn test_create_tcp_transport_bad_host() {
        let config = TransportConfig {
            kind: TransportKind::Tcp,
            host: "no such host name".to_string(),
            ..TransportConfig::default()
        };
        assert!(create_transport(&config).is_err());
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Simulated.to_string(), "simulated");
        assert_eq!(TransportKind::Tcp.to_string(), "tcp");
    }
}

//! openloop - open-loop load generator
//!
//! openloop issues request/response calls at a target arrival rate that does
//! not depend on how fast responses come back, and measures the resulting
//! latency distribution and achieved throughput. Because the schedule never
//! waits for the system under test, queueing delay shows up in the measured
//! latencies instead of silently lowering the offered load.
//!
//! # Architecture
//!
//! - **Arrival processes**: Poisson (exponential gaps) or constant spacing
//! - **Dispatch loop**: busy-polls a monotonic clock and fires calls
//!   without waiting on their results
//! - **Transports**: simulated in-process, or TCP against `openloop --mode server`
//! - **Stats**: sharded HdrHistogram written from any completion thread
//! - **Drain**: bounded wait for outstanding calls before reporting

pub mod config;
pub mod distribution;
pub mod error;
pub mod output;
pub mod stats;
pub mod transport;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::{Config, RunParameters};
pub use error::{ConfigError, RunError, TransportError};
pub use transport::Transport;
pub use worker::{LoadGenerationWorker, RunResult};

/// Result type used throughout openloop
pub type Result<T> = anyhow::Result<T>;

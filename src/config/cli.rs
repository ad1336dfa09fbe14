//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Generate load against a transport (default)
    Client,
    /// Run the TCP echo server that answers the tcp transport
    Server,
}

/// openloop - open-loop load generator with Poisson arrivals
#[derive(Parser, Debug)]
#[command(name = "openloop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: client or server
    #[arg(long, value_enum, default_value = "client")]
    pub mode: ExecutionMode,

    /// Port for the echo server to listen on (server mode only)
    #[arg(long, default_value = "9999")]
    pub listen_port: u16,

    /// TOML configuration file (command-line options take precedence)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    // === Load Options ===
    /// Target rate in calls per second
    #[arg(short = 'q', long)]
    pub target_qps: Option<f64>,

    /// Issuing duration (e.g., 60s, 5m, 1h)
    #[arg(short = 'd', long)]
    pub duration: Option<String>,

    /// Longest wait for outstanding calls after issuing ends (e.g., 500ms, 2s)
    #[arg(long)]
    pub drain_timeout: Option<String>,

    /// Inter-arrival distribution
    #[arg(long, value_enum)]
    pub arrival: Option<ArrivalType>,

    /// RNG seed for a reproducible arrival schedule
    #[arg(long)]
    pub seed: Option<u64>,

    /// How the dispatch loop waits between calls
    #[arg(long, value_enum)]
    pub wait: Option<WaitType>,

    /// Spin window for hybrid waiting (e.g., 200us)
    #[arg(long)]
    pub spin_window: Option<String>,

    // === Transport Options ===
    /// Transport used to issue calls
    #[arg(long, value_enum)]
    pub transport: Option<TransportType>,

    /// Server host (tcp transport)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (tcp transport)
    #[arg(long)]
    pub port: Option<u16>,

    /// Request payload size (e.g., 0, 64, 1k)
    #[arg(long)]
    pub client_payload: Option<String>,

    /// Response payload size (e.g., 0, 64, 1k)
    #[arg(long)]
    pub server_payload: Option<String>,

    /// Simulated call latency (e.g., 10ms, 250us)
    #[arg(long)]
    pub simulated_latency: Option<String>,

    /// Standard deviation of the simulated latency (e.g., 1ms)
    #[arg(long)]
    pub simulated_jitter: Option<String>,

    /// Fraction of simulated calls that fail (0.0-1.0)
    #[arg(long)]
    pub failure_rate: Option<f64>,

    /// Threads running call completions (0 = one per CPU)
    #[arg(long)]
    pub completion_threads: Option<usize>,

    // === Output Options ===
    /// Save the latency histogram to this file (HdrHistogram V2 format)
    #[arg(long, value_name = "PATH")]
    pub save_histogram: Option<PathBuf>,

    /// Write a JSON summary to this file
    #[arg(long, value_name = "PATH")]
    pub json_output: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Log filter (e.g., info, debug, openloop=trace)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArrivalType {
    Poisson,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WaitType {
    Spin,
    Hybrid,
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportType {
    Simulated,
    Tcp,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check argument combinations clap cannot express
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(rate) = self.failure_rate {
            if !(0.0..=1.0).contains(&rate) {
                anyhow::bail!("--failure-rate must be between 0.0 and 1.0, got {}", rate);
            }
        }
        if self.mode == ExecutionMode::Server && self.config.is_some() {
            anyhow::bail!("--config is not used in server mode");
        }
        Ok(())
    }
}

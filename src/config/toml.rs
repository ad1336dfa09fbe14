//! TOML configuration file parsing

use super::cli_convert::{
    convert_arrival_type, convert_transport_type, convert_wait_type, parse_duration, parse_size,
    parse_time_us,
};
use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Override run settings
    if let Some(qps) = cli.target_qps {
        config.run.target_qps = qps;
    }
    if let Some(ref duration_str) = cli.duration {
        config.run.duration_secs = parse_duration(duration_str)?;
    }
    if let Some(ref drain_str) = cli.drain_timeout {
        config.run.drain_timeout_ms = parse_time_us(drain_str)? / 1000;
    }
    if let Some(arrival) = cli.arrival {
        config.run.arrival = convert_arrival_type(arrival);
    }
    if let Some(seed) = cli.seed {
        config.run.seed = Some(seed);
    }
    if let Some(wait) = cli.wait {
        config.run.wait = convert_wait_type(wait);
    }
    if let Some(ref window_str) = cli.spin_window {
        config.run.spin_window_us = parse_time_us(window_str)?;
    }

    // Override transport settings
    if let Some(kind) = cli.transport {
        config.transport.kind = convert_transport_type(kind);
    }
    if let Some(ref host) = cli.host {
        config.transport.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.transport.port = port;
    }
    if let Some(ref size_str) = cli.client_payload {
        config.transport.client_payload = parse_payload(size_str)?;
    }
    if let Some(ref size_str) = cli.server_payload {
        config.transport.server_payload = parse_payload(size_str)?;
    }
    if let Some(ref latency_str) = cli.simulated_latency {
        config.transport.simulated_latency_us = parse_time_us(latency_str)?;
    }
    if let Some(ref jitter_str) = cli.simulated_jitter {
        config.transport.simulated_jitter_us = parse_time_us(jitter_str)?;
    }
    if let Some(rate) = cli.failure_rate {
        config.transport.failure_rate = rate;
    }
    if let Some(threads) = cli.completion_threads {
        config.transport.completion_threads = threads;
    }

    // Override output settings
    if let Some(ref path) = cli.save_histogram {
        config.output.save_histogram = Some(path.clone());
    }
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    Ok(config)
}

fn parse_payload(s: &str) -> Result<usize> {
    let bytes = parse_size(s)?;
    usize::try_from(bytes).with_context(|| format!("Payload size too large: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_toml_basic() {
        let toml = r#"
[run]
target_qps = 500.0
duration_secs = 30
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.run.target_qps, 500.0);
        assert_eq!(config.run.duration_secs, 30);
        assert_eq!(config.run.drain_timeout_ms, 1000);
        assert_eq!(config.run.arrival, ArrivalKind::Poisson);
        assert_eq!(config.run.wait, WaitMode::Spin);
        assert_eq!(config.transport.kind, TransportKind::Simulated);
    }

    #[test]
    fn test_parse_toml_full() {
        let toml = r#"
[run]
target_qps = 1000.0
duration_secs = 5
drain_timeout_ms = 250
arrival = "constant"
seed = 42
wait = "sleep"

[transport]
kind = "tcp"
host = "10.0.0.5"
port = 7000
client_payload = 64
server_payload = 128

[output]
save_histogram = "latency.hgrm"
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.run.arrival, ArrivalKind::Constant);
        assert_eq!(config.run.seed, Some(42));
        assert_eq!(config.run.wait, WaitMode::Sleep);
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport.host, "10.0.0.5");
        assert_eq!(config.transport.server_payload, 128);
        assert_eq!(
            config.output.save_histogram.as_deref(),
            Some(Path::new("latency.hgrm"))
        );
    }

    #[test]
    fn test_parse_toml_rejects_unknown_arrival() {
        let toml = r#"
[run]
target_qps = 10.0
duration_secs = 1
arrival = "bursty"
"#;
        assert!(parse_toml_string(toml).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[run]\ntarget_qps = 50.0\nduration_secs = 20\n\n[transport]\nport = 8000\n"
        )
        .unwrap();

        let config = parse_toml_file(file.path()).unwrap();
        let cli = Cli::try_parse_from(["openloop", "-q", "75", "--server-payload", "1k"]).unwrap();
        let merged = merge_cli_with_config(&cli, config).unwrap();

        assert_eq!(merged.run.target_qps, 75.0);
        assert_eq!(merged.run.duration_secs, 20);
        assert_eq!(merged.transport.port, 8000);
        assert_eq!(merged.transport.server_payload, 1024);
    }

    #[test]
    fn test_missing_file() {
        assert!(parse_toml_file(Path::new("/nonexistent/openloop.toml")).is_err());
    }
}

//! CLI to Config conversion utilities

use crate::config::cli::{self, Cli};
use crate::config::{toml, validator, Config, WaitMode};
use crate::distribution::ArrivalKind;
use crate::transport::TransportKind;
use anyhow::{Context, Result};

/// Parse a size string (e.g., "1k", "64", "2M") to bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("k") || s.ends_with("kb") {
        (s.trim_end_matches("kb").trim_end_matches("k"), 1024u64)
    } else if s.ends_with("m") || s.ends_with("mb") {
        (s.trim_end_matches("mb").trim_end_matches("m"), 1024 * 1024)
    } else if s.ends_with("b") {
        (s.trim_end_matches("b"), 1)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid size format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Size out of range: {}", s))
}

/// Parse a duration string (e.g., "60s", "5m", "1h") to seconds
pub fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("sec") || s.ends_with("s") {
        (s.trim_end_matches("sec").trim_end_matches("s"), 1u64)
    } else if s.ends_with("min") || s.ends_with("m") {
        (s.trim_end_matches("min").trim_end_matches("m"), 60)
    } else if s.ends_with("hr") || s.ends_with("h") {
        (s.trim_end_matches("hr").trim_end_matches("h"), 3600)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", s))
}

/// Parse a time string (e.g., "100us", "1ms", "2s") to microseconds
pub fn parse_time_us(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("us") {
        (s.trim_end_matches("us"), 1u64)
    } else if s.ends_with("ms") {
        (s.trim_end_matches("ms"), 1000)
    } else if s.ends_with("s") {
        (s.trim_end_matches("s"), 1_000_000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid time format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Time out of range: {}", s))
}

/// Convert CLI ArrivalType to ArrivalKind
pub fn convert_arrival_type(cli_type: cli::ArrivalType) -> ArrivalKind {
    match cli_type {
        cli::ArrivalType::Poisson => ArrivalKind::Poisson,
        cli::ArrivalType::Constant => ArrivalKind::Constant,
    }
}

/// Convert CLI WaitType to WaitMode
pub fn convert_wait_type(cli_type: cli::WaitType) -> WaitMode {
    match cli_type {
        cli::WaitType::Spin => WaitMode::Spin,
        cli::WaitType::Hybrid => WaitMode::Hybrid,
        cli::WaitType::Sleep => WaitMode::Sleep,
    }
}

/// Convert CLI TransportType to TransportKind
pub fn convert_transport_type(cli_type: cli::TransportType) -> TransportKind {
    match cli_type {
        cli::TransportType::Simulated => TransportKind::Simulated,
        cli::TransportType::Tcp => TransportKind::Tcp,
    }
}

/// Build the validated run configuration from the command line
///
/// Starts from the TOML file given with `--config` (or the defaults), then
/// applies every option given on the command line.
pub fn build_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => toml::parse_toml_file(path)?,
        None => Config::default(),
    };

    let config = toml::merge_cli_with_config(cli, base)?;
    validator::validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

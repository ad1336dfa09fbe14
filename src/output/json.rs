//! JSON output formatting
//!
//! Writes one summary document per run: test information (host, timestamps,
//! configuration), call counts, latency percentiles and dispatch lag.

use crate::config::Config;
use crate::stats::histogram::LatencyHistogram;
use crate::util::time::format_micros;
use crate::worker::RunResult;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Latency with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonMicros {
    pub micros: u64,
    pub human: String,
}

impl JsonMicros {
    pub fn new(micros: u64) -> Self {
        Self {
            micros,
            human: format_micros(micros),
        }
    }
}

/// Latency statistics with percentiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonLatency {
    pub samples: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<JsonMicros>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<JsonMicros>,
    pub p50: JsonMicros,
    pub p90: JsonMicros,
    pub p95: JsonMicros,
    pub p99: JsonMicros,
    pub p99_9: JsonMicros,
    pub max: JsonMicros,
}

impl JsonLatency {
    pub fn from_histogram(hist: &LatencyHistogram) -> Self {
        let at = |p: f64| JsonMicros::new(hist.value_at_percentile(p));
        Self {
            samples: hist.total_count(),
            min: hist.min().map(JsonMicros::new),
            mean: hist.mean().map(|m| JsonMicros::new(m.round() as u64)),
            p50: at(50.0),
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
            p99_9: at(99.9),
            max: at(100.0),
        }
    }
}

/// Run configuration as recorded in the output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonTestConfig {
    pub target_qps: f64,
    pub duration_secs: u64,
    pub total_calls: u64,
    pub arrival: String,
    pub wait: String,
    pub drain_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub transport: String,
    pub client_payload: usize,
    pub server_payload: usize,
}

/// Test information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonTestInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub config: JsonTestConfig,
}

/// Call counts and throughput
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCalls {
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub outstanding: u64,
    pub complete: bool,
    pub elapsed_secs: f64,
    pub actual_qps: f64,
}

/// Complete JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunOutput {
    pub test_info: JsonTestInfo,
    pub calls: JsonCalls,
    pub latency: JsonLatency,
    pub dispatch_lag: JsonLatency,
}

/// Build JsonTestConfig
pub fn build_test_config(config: &Config) -> JsonTestConfig {
    JsonTestConfig {
        target_qps: config.run.target_qps,
        duration_secs: config.run.duration_secs,
        total_calls: config
            .run
            .parameters()
            .map(|p| p.total_calls())
            .unwrap_or(0),
        arrival: config.run.arrival.to_string(),
        wait: config.run.wait_strategy().name().to_string(),
        drain_timeout_ms: config.run.drain_timeout_ms,
        seed: config.run.seed,
        transport: config.transport.kind.to_string(),
        client_payload: config.transport.client_payload,
        server_payload: config.transport.server_payload,
    }
}

/// Assemble the output document for a finished run
pub fn build_run_output(
    result: &RunResult,
    config: &Config,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> JsonRunOutput {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok());

    JsonRunOutput {
        test_info: JsonTestInfo {
            hostname,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time,
            end_time,
            config: build_test_config(config),
        },
        calls: JsonCalls {
            issued: result.issued,
            succeeded: result.succeeded,
            failed: result.failed,
            outstanding: result.outstanding(),
            complete: result.is_complete(),
            elapsed_secs: result.elapsed.as_secs_f64(),
            actual_qps: result.actual_qps(),
        },
        latency: JsonLatency::from_histogram(&result.histogram),
        dispatch_lag: JsonLatency::from_histogram(&result.dispatch_lag),
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, output: &JsonRunOutput, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, output)?;
    } else {
        serde_json::to_writer(writer, output)?;
    }

    Ok(())
}

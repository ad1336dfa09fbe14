//! Human-readable text output

use crate::config::{Config, TransportConfig};
use crate::util::time::{format_duration, format_micros, format_rate};
use crate::worker::RunResult;
use std::fmt::Write;

/// Label column width of the summary block
const LABEL_WIDTH: usize = 32;

/// Render the latency/QPS summary block
///
/// One `label: value` line per metric, the labels padded to a fixed column
/// so several runs can be diffed line by line. Latencies are whole
/// microseconds.
pub fn format_summary(result: &RunResult, transport: &TransportConfig) -> String {
    let mut lines: Vec<(String, String)> = vec![
        ("Server Payload Size:".into(), transport.server_payload.to_string()),
        ("Client Payload Size:".into(), transport.client_payload.to_string()),
    ];

    for (p, micros) in result.percentiles() {
        let label = if p >= 100.0 {
            "Maximum Latency (in micros):".to_string()
        } else {
            format!("{}%ile Latency (in micros):", p)
        };
        lines.push((label, micros.to_string()));
    }

    lines.push(("Actual QPS:".into(), format!("{:.0}", result.actual_qps())));
    lines.push(("Target QPS:".into(), format!("{}", result.target_qps)));

    let mut out = String::new();
    for (label, value) in lines {
        let _ = writeln!(out, "{:<width$}{}", label, value, width = LABEL_WIDTH);
    }
    out
}

/// Print run results to console
///
/// Displays:
/// - Call counts (issued, succeeded, failed)
/// - The latency/QPS summary block
/// - Latency min/mean and dispatch lag
/// - A warning if the drain gave up on outstanding calls
pub fn print_results(result: &RunResult, config: &Config) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    TEST RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    println!("Elapsed Time: {:.3}s", result.elapsed.as_secs_f64());
    println!();

    println!("Calls:");
    println!("  Issued:    {}", result.issued);
    println!("  Succeeded: {}", result.succeeded);
    if result.failed > 0 {
        println!("  Failed:    {}", result.failed);
    }
    if !result.is_complete() {
        println!(
            "  Incomplete: {} calls still outstanding after the {} drain timeout",
            result.outstanding(),
            format_duration(config.run.drain_timeout())
        );
    }
    println!();

    print!("{}", format_summary(result, &config.transport));
    println!();

    println!("Latency:");
    match (result.histogram.min(), result.histogram.mean()) {
        (Some(min), Some(mean)) => {
            println!("  Min:    {}", format_micros(min));
            println!("  Mean:   {}", format_micros(mean.round() as u64));
            println!("  Rate:   {} calls/s", format_rate(result.actual_qps()));
        }
        _ => println!("  No latency data collected"),
    }
    println!();

    if !result.dispatch_lag.is_empty() {
        println!("Dispatch Lag (issue time - scheduled time):");
        println!(
            "  p50:    {}",
            format_micros(result.dispatch_lag.value_at_percentile(50.0))
        );
        println!(
            "  p99:    {}",
            format_micros(result.dispatch_lag.value_at_percentile(99.0))
        );
        println!(
            "  Max:    {}",
            format_micros(result.dispatch_lag.value_at_percentile(100.0))
        );
        println!();
    }
}

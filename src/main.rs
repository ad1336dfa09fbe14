//! openloop CLI entry point

use anyhow::{Context, Result};
use openloop::config::cli::{Cli, ExecutionMode};
use openloop::config::{cli_convert, Config};
use openloop::output::{histogram_file, json, text};
use openloop::worker::{LoadGenerationWorker, RunResult};
use openloop::RunError;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;
    init_logging(&cli.log_level);

    println!("openloop v{}", env!("CARGO_PKG_VERSION"));
    println!("Open-loop load generator");
    println!();

    match cli.mode {
        ExecutionMode::Client => run_client(cli),
        ExecutionMode::Server => run_server(cli),
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("Warning: invalid log filter '{}' ({}), using 'info'", filter, e);
        EnvFilter::new("info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Generate load and report
fn run_client(cli: Cli) -> Result<()> {
    let config = cli_convert::build_config(&cli)?;
    print_configuration(&config);

    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let transport = openloop::transport::create_transport(&config.transport)
        .context("Failed to create transport")?;
    let worker = LoadGenerationWorker::from_config(&config.run, transport)
        .context("Invalid run configuration")?;

    println!();
    println!("Starting test...");
    println!();

    let start_time = chrono::Utc::now();
    let outcome = worker.run();
    let end_time = chrono::Utc::now();

    match outcome {
        Ok(result) => report(&result, &config, start_time, end_time),
        Err(RunError::Issue { source, partial }) => {
            println!("Run aborted: {}", source);
            println!("Partial results for the calls that were issued:");
            println!();
            report(&partial, &config, start_time, end_time)?;
            Err(anyhow::Error::new(source).context(format!(
                "run aborted after {} issued calls",
                partial.issued
            )))
        }
        Err(e) => Err(e.into()),
    }
}

fn report(
    result: &RunResult,
    config: &Config,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    text::print_results(result, config);

    if let Some(ref path) = config.output.save_histogram {
        histogram_file::save_histogram(path, &result.histogram)?;
        println!("Histogram saved to {}", path.display());
    }

    if let Some(ref path) = config.output.json_output {
        let output = json::build_run_output(result, config, start_time, end_time);
        json::write_json_output(path, &output, true)?;
        println!("JSON results written to {}", path.display());
    }

    Ok(())
}

fn print_configuration(config: &Config) {
    println!("Configuration:");
    println!("  Run:");
    match config.run.parameters() {
        Ok(params) => println!("    Load: {}", params),
        Err(e) => println!("    Load: invalid ({})", e),
    }
    println!("    Arrivals: {}", config.run.arrival);
    if let Some(seed) = config.run.seed {
        println!("    Seed: {}", seed);
    }
    println!("    Wait: {}", config.run.wait_strategy().name());
    println!("    Drain timeout: {}ms", config.run.drain_timeout_ms);
    println!("  Transport:");
    println!("    {}", config.transport);
}

/// Run the TCP echo server that answers the tcp transport
fn run_server(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.listen_port))
            .await
            .with_context(|| format!("Failed to bind port {}", cli.listen_port))?;
        println!("Echo server listening on port {}", cli.listen_port);

        openloop::transport::tcp::serve(listener).await
    })
}

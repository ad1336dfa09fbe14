//! Configuration validation

use super::*;
use crate::transport::tcp::MAX_FRAME_LEN;
use anyhow::Result;

/// Longest accepted drain timeout
const MAX_DRAIN_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_run(&config.run)?;
    validate_transport(&config.transport)?;
    Ok(())
}

/// Validate rate, duration and pacing settings
pub fn validate_run(run: &RunConfig) -> Result<()> {
    let params = run.parameters()?;

    if run.drain_timeout_ms > MAX_DRAIN_TIMEOUT_MS {
        anyhow::bail!(
            "drain_timeout_ms must be <= {} (10 minutes), got {}",
            MAX_DRAIN_TIMEOUT_MS,
            run.drain_timeout_ms
        );
    }

    if run.wait == WaitMode::Hybrid && run.spin_window_us == 0 {
        anyhow::bail!("spin_window_us must be greater than 0 for hybrid waiting");
    }

    // Sub-microsecond mean gaps outrun the clock itself
    if params.target_qps() > 1_000_000.0 {
        tracing::warn!(
            target_qps = params.target_qps(),
            "target rate above 1M calls/s, dispatch will fall behind schedule"
        );
    }

    Ok(())
}

/// Validate transport parameters
pub fn validate_transport(transport: &TransportConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&transport.failure_rate) {
        return Err(ConfigError::InvalidFailureRate(transport.failure_rate).into());
    }

    match transport.kind {
        TransportKind::Tcp => {
            if transport.host.is_empty() {
                anyhow::bail!("transport host must not be empty");
            }
            if transport.port == 0 {
                anyhow::bail!("transport port must be greater than 0");
            }
            if transport.client_payload > MAX_FRAME_LEN - 4 {
                anyhow::bail!(
                    "client_payload must be < {} bytes, got {}",
                    MAX_FRAME_LEN - 4,
                    transport.client_payload
                );
            }
            if transport.server_payload > MAX_FRAME_LEN {
                anyhow::bail!(
                    "server_payload must be <= {} bytes, got {}",
                    MAX_FRAME_LEN,
                    transport.server_payload
                );
            }
        }
        TransportKind::Simulated => {
            if transport.client_payload > 0 || transport.server_payload > 0 {
                tracing::warn!("payload sizes are ignored by the simulated transport");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_run_rate_and_duration() {
        let mut run = RunConfig::default();

        run.target_qps = 0.0;
        assert!(validate_run(&run).is_err());

        run.target_qps = 100.0;
        run.duration_secs = 0;
        assert!(validate_run(&run).is_err());

        let err = validate_run(&run).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::ZeroDuration));

        // 0.5 calls/s for 1s is an empty run, not an error
        run.target_qps = 0.5;
        run.duration_secs = 1;
        assert!(validate_run(&run).is_ok());
    }

    #[test]
    fn test_validate_drain_timeout() {
        let mut run = RunConfig::default();
        run.drain_timeout_ms = 0;
        assert!(validate_run(&run).is_ok());

        run.drain_timeout_ms = MAX_DRAIN_TIMEOUT_MS + 1;
        assert!(validate_run(&run).is_err());
    }

    #[test]
    fn test_validate_hybrid_window() {
        let mut run = RunConfig::default();
        run.wait = WaitMode::Hybrid;
        run.spin_window_us = 0;
        assert!(validate_run(&run).is_err());

        run.spin_window_us = 100;
        assert!(validate_run(&run).is_ok());
    }

    #[test]
    fn test_validate_failure_rate() {
        let mut transport = TransportConfig::default();
        transport.failure_rate = 0.25;
        assert!(validate_transport(&transport).is_ok());

        transport.failure_rate = 1.01;
        assert!(validate_transport(&transport).is_err());
    }

    #[test]
    fn test_validate_tcp_settings() {
        let mut transport = TransportConfig {
            kind: TransportKind::Tcp,
            ..TransportConfig::default()
        };
        assert!(validate_transport(&transport).is_ok());

        transport.port = 0;
        assert!(validate_transport(&transport).is_err());

        transport.port = 9999;
        transport.server_payload = MAX_FRAME_LEN + 1;
        assert!(validate_transport(&transport).is_err());
    }
}

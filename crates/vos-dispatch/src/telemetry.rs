use crate::config::{AppEnvironment, TelemetryConfig};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter { value: String, source: ParseError },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Resolve the filter directive: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|source| {
            TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            }
        }),
    }
}

pub fn init(environment: AppEnvironment, config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(config)?;

    // Module targets in development only.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(environment == AppEnvironment::Development)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_log_filter() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = TelemetryConfig {
            log_level: "vos_dispatch=[".to_string(),
        };
        match env_filter(&config) {
            Err(TelemetryError::EnvFilter { value, .. }) => assert_eq!(value, "vos_dispatch=["),
            other => panic!("expected env filter error, got {other:?}"),
        }
    }
}

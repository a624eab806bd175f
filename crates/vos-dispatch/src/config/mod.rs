use std::env;
use std::net::{IpAddr, SocketAddr};

use crate::logistics::DispatchMode;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the dispatch service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mode = match env::var("DISPATCH_MODE") {
            Ok(raw) => raw
                .parse::<DispatchMode>()
                .map_err(|_| ConfigError::InvalidDispatchMode(raw))?,
            Err(_) => DispatchMode::default(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dispatch: DispatchConfig { mode },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Which architectural variant drives the vehicle status when a job is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("DISPATCH_MODE must be 'routed' or 'direct', got '{0}'")]
    InvalidDispatchMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("DISPATCH_MODE");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.dispatch.mode, DispatchMode::Routed);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_direct_dispatch_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DISPATCH_MODE", "Direct");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.dispatch.mode, DispatchMode::Direct);
        reset_env();
    }

    #[test]
    fn rejects_unknown_dispatch_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DISPATCH_MODE", "teleport");
        match AppConfig::load() {
            Err(ConfigError::InvalidDispatchMode(raw)) => assert_eq!(raw, "teleport"),
            other => panic!("expected invalid dispatch mode, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_port() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_PORT", "eighty");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidPort)));
        reset_env();
    }
}

pub mod config;
pub mod error;
pub mod logistics;
pub mod telemetry;

use crate::config::ConfigError;
use crate::logistics::router::failure;
use crate::logistics::DispatchServiceError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failures surfaced by the service binary: startup, serving, and scripted dispatch runs.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Dispatch(DispatchServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Dispatch(err) => write!(f, "dispatch error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Dispatch(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Dispatch(err) => failure(err),
            other => {
                let body = Json(json!({ "error": other.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<DispatchServiceError> for AppError {
    fn from(value: DispatchServiceError) -> Self {
        Self::Dispatch(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistics::EntityKind;

    #[test]
    fn dispatch_errors_keep_their_http_status() {
        let missing = AppError::from(DispatchServiceError::NotFound {
            entity: EntityKind::Route.label(),
            id: "route-9".to_string(),
        });
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let config = AppError::from(ConfigError::InvalidPort);
        assert_eq!(
            config.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn display_prefixes_the_failing_layer() {
        let err = AppError::from(ConfigError::InvalidDispatchMode("teleport".to_string()));
        assert_eq!(
            err.to_string(),
            "configuration error: DISPATCH_MODE must be 'routed' or 'direct', got 'teleport'"
        );
    }
}

use crate::cli::ServeArgs;
use crate::infra::{in_memory_dispatch, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vos_dispatch::config::AppConfig;
use vos_dispatch::error::AppError;
use vos_dispatch::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(mode) = args.mode.take() {
        config.dispatch.mode = mode;
    }

    telemetry::init(config.environment, &config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let dispatch_service = in_memory_dispatch(config.dispatch.mode);
    let app = with_operational_routes(dispatch_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        mode = ?config.dispatch.mode,
        %addr,
        "dispatch status service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

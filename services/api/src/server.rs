use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, demo_sources, AppState};
use crate::routes::with_credential_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hireproof::config::AppConfig;
use hireproof::error::AppError;
use hireproof::telemetry;
use hireproof::workflows::credentialing::PipelineConfig;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let pipeline_config = PipelineConfig::from_env()?;
    let pipeline = build_pipeline(pipeline_config, demo_sources(), None);

    let app = with_credential_routes(pipeline.service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "credentialing pipeline ready");

    axum::serve(listener, app).await?;
    Ok(())
}

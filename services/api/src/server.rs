use crate::cli::ServeArgs;
use crate::infra::{seeded_engine, AppState};
use crate::routes::with_selection_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use tutor_select::config::AppConfig;
use tutor_select::error::AppError;
use tutor_select::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.seed_applications.take() {
        config.seed.applications_csv = Some(path);
    }
    if let Some(path) = args.seed_users.take() {
        config.seed.users_csv = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = seeded_engine(
        config.engine,
        config.seed.applications_csv.as_deref(),
        config.seed.users_csv.as_deref(),
    )?;

    let app = with_selection_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        lock_timeout = ?config.engine.lock_timeout,
        "tutor selection service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

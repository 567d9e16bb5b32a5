use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aerolog::clock::{Clock, SystemClock};
use aerolog::config::AppConfig;
use aerolog::error::AppError;
use aerolog::telemetry;
use aerolog::workflows::compliance::ComplianceEngine;
use aerolog::workflows::ingestion::{QuotaLedger, ScanLifecycleManager};
use aerolog::workflows::maintenance::AircraftStatusService;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::infra::{
    AppState, ConfiguredExtractor, InMemoryBulletinFeed, InMemoryMaintenanceStore,
};
use crate::routes::with_api_routes;

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryMaintenanceStore::new(clock.clone()));
    let endpoint = config.ingestion.vision_endpoint.as_deref();
    let extractor = ConfiguredExtractor::from_endpoint(endpoint);
    if extractor.is_canned() {
        warn!("VISION_ENDPOINT not set; scans use canned extraction results");
    }
    let quota = Arc::new(QuotaLedger::new(config.ingestion.quota_ceiling, clock.clone()));

    let manager = Arc::new(ScanLifecycleManager::new(
        store.clone(),
        Arc::new(extractor),
        quota,
        clock.clone(),
        config.ingestion.clone(),
    ));
    let status_service = Arc::new(AircraftStatusService::new(
        store,
        Arc::new(InMemoryBulletinFeed::default()),
        ComplianceEngine::new(config.compliance),
        clock,
        config.ingestion.store_timeout,
    ));

    let app = with_api_routes(manager, status_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        quota_ceiling = config.ingestion.quota_ceiling,
        "aerolog ingestion service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

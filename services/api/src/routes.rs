use std::sync::atomic::Ordering;
use std::sync::Arc;

use aerolog::workflows::ingestion::{ingestion_router, ScanLifecycleManager, VisionExtractor};
use aerolog::workflows::maintenance::{
    aircraft_router, AircraftStatusService, BulletinFeed, MaintenanceRecordStore,
};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};
use serde_json::json;

use crate::infra::AppState;

/// Scan ingestion, aircraft status, and operational endpoints on one router.
pub(crate) fn with_api_routes<S, V, B>(
    ingestion: Arc<ScanLifecycleManager<S, V>>,
    aircraft: Arc<AircraftStatusService<S, B>>,
) -> axum::Router
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
    B: BulletinFeed + 'static,
{
    ingestion_router(ingestion)
        .merge(aircraft_router(aircraft))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Acquire);
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initializing")
    };

    (status, Json(json!({ "status": label })))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use aerolog::clock::{Clock, SystemClock};
    use aerolog::config::IngestionConfig;
    use aerolog::workflows::compliance::ComplianceEngine;
    use aerolog::workflows::ingestion::{QuotaLedger, ACCOUNT_HEADER};
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use crate::infra::{CannedVisionExtractor, InMemoryBulletinFeed, InMemoryMaintenanceStore};

    fn app(ready: bool) -> axum::Router {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryMaintenanceStore::new(clock.clone()));
        let config = IngestionConfig::default();
        let quota = Arc::new(QuotaLedger::new(config.quota_ceiling, clock.clone()));
        let manager = Arc::new(ScanLifecycleManager::new(
            store.clone(),
            Arc::new(CannedVisionExtractor),
            quota,
            clock.clone(),
            config,
        ));
        let status = Arc::new(AircraftStatusService::new(
            store,
            Arc::new(InMemoryBulletinFeed::default()),
            ComplianceEngine::default(),
            clock,
            Duration::from_secs(1),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };

        with_api_routes(manager, status).layer(Extension(state))
    }

    async fn status_of(router: axum::Router, request: Request<Body>) -> StatusCode {
        router.oneshot(request).await.expect("response").status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let request = Request::get("/health")
            .body(Body::empty())
            .expect("build request");
        assert_eq!(status_of(app(false), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_flag() {
        let request = || {
            Request::get("/ready")
                .body(Body::empty())
                .expect("build request")
        };
        assert_eq!(
            status_of(app(false), request()).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(app(true), request()).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn merged_router_serves_both_surfaces() {
        let router = app(true);

        let quota = Request::get("/api/v1/quota/status")
            .header(ACCOUNT_HEADER, "acct-demo")
            .body(Body::empty())
            .expect("build request");
        assert_eq!(status_of(router.clone(), quota).await, StatusCode::OK);

        let compliance = Request::get("/api/v1/aircraft/N4512K/compliance")
            .body(Body::empty())
            .expect("build request");
        assert_eq!(status_of(router, compliance).await, StatusCode::OK);
    }
}

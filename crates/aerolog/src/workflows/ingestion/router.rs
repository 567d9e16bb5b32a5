use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{AccountId, ScanId, ScanState, ScanSubmission, ValidatedFields};
use super::extraction::VisionExtractor;
use super::service::{ScanError, ScanLifecycleManager};
use crate::workflows::maintenance::{AircraftId, MaintenanceRecordStore};

/// Header carrying the account resolved by the authentication layer.
pub const ACCOUNT_HEADER: &str = "x-account-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScanRequest {
    pub aircraft_id: String,
    pub document_type: String,
    /// Base64-encoded document image.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyScanRequest {
    pub validated_fields: ValidatedFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStateView {
    pub scan_id: ScanId,
    pub state: ScanState,
}

/// Router builder exposing the scan ingestion endpoints.
pub fn ingestion_router<S, V>(manager: Arc<ScanLifecycleManager<S, V>>) -> Router
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    Router::new()
        .route("/api/v1/scans", post(submit_handler::<S, V>))
        .route("/api/v1/scans/:scan_id", get(scan_handler::<S, V>))
        .route(
            "/api/v1/scans/:scan_id/validation",
            post(validation_handler::<S, V>),
        )
        .route("/api/v1/scans/:scan_id/apply", post(apply_handler::<S, V>))
        .route("/api/v1/scans/:scan_id/reject", post(reject_handler::<S, V>))
        .route(
            "/api/v1/aircraft/:aircraft_id/scans",
            get(history_handler::<S, V>),
        )
        .route("/api/v1/quota/status", get(quota_handler::<S, V>))
        .with_state(manager)
}

impl ScanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ScanError::ExtractionFailed { .. } => StatusCode::BAD_GATEWAY,
            ScanError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            ScanError::RecordStoreWriteFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::RecordRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ScanError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScanError::NotFound(_) => StatusCode::NOT_FOUND,
            ScanError::Quota(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(crate) fn error_response(error: ScanError) -> Response {
    let mut payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
        "retryable": error.retryable(),
    });

    match &error {
        ScanError::ExtractionFailed { scan_id, state, .. } => {
            payload["scanId"] = json!(scan_id);
            payload["state"] = json!(state);
        }
        ScanError::RecordStoreWriteFailed { scan_id, .. }
        | ScanError::RecordRejected { scan_id, .. } => {
            payload["scanId"] = json!(scan_id);
            payload["state"] = json!(ScanState::Validated);
        }
        ScanError::QuotaExceeded { period_end, .. } => {
            payload["periodEnd"] = json!(period_end);
        }
        _ => {}
    }

    (error.status_code(), axum::Json(payload)).into_response()
}

fn account_from(headers: &HeaderMap) -> Result<AccountId, ScanError> {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| AccountId(value.to_string()))
        .ok_or_else(|| ScanError::InvalidInput(format!("missing {ACCOUNT_HEADER} header")))
}

pub(crate) async fn submit_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SubmitScanRequest>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    let account_id = match account_from(&headers) {
        Ok(account_id) => account_id,
        Err(error) => return error_response(error),
    };

    let image = match BASE64.decode(request.image.trim()) {
        Ok(bytes) => bytes,
        Err(err) => {
            return error_response(ScanError::InvalidInput(format!(
                "image is not valid base64: {err}"
            )))
        }
    };

    let submission = ScanSubmission {
        account_id,
        aircraft_id: AircraftId(request.aircraft_id),
        document_type: request.document_type,
        image,
    };

    match manager.submit(submission).await {
        Ok(scan) => {
            let view = ScanStateView {
                scan_id: scan.id,
                state: scan.state,
            };
            (StatusCode::CREATED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn scan_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    Path(scan_id): Path<String>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    match manager.get(&ScanId(scan_id)).await {
        Ok(scan) => (StatusCode::OK, axum::Json(scan.summary())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validation_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    Path(scan_id): Path<String>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    match manager.begin_validation(&ScanId(scan_id)).await {
        Ok(sheet) => (StatusCode::OK, axum::Json(sheet)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn apply_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    Path(scan_id): Path<String>,
    axum::Json(request): axum::Json<ApplyScanRequest>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    match manager
        .apply(&ScanId(scan_id), request.validated_fields)
        .await
    {
        Ok(scan) => {
            let view = ScanStateView {
                scan_id: scan.id,
                state: scan.state,
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    Path(scan_id): Path<String>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    match manager.reject(&ScanId(scan_id)).await {
        Ok(scan) => {
            let view = ScanStateView {
                scan_id: scan.id,
                state: scan.state,
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    Path(aircraft_id): Path<String>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    let history = manager.history(&AircraftId(aircraft_id)).await;
    (StatusCode::OK, axum::Json(history)).into_response()
}

pub(crate) async fn quota_handler<S, V>(
    State(manager): State<Arc<ScanLifecycleManager<S, V>>>,
    headers: HeaderMap,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    match account_from(&headers) {
        Ok(account_id) => {
            let status = manager.quota_status(&account_id);
            (StatusCode::OK, axum::Json(status)).into_response()
        }
        Err(error) => error_response(error),
    }
}

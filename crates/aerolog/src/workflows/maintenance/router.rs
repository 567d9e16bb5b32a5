use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::bulletins::BulletinFeed;
use super::domain::{AircraftId, LimitInputs};
use super::service::{AircraftStatusError, AircraftStatusService};
use super::store::{MaintenanceRecordStore, StoreError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceQuery {
    pub as_of: Option<NaiveDate>,
}

/// Router builder for limits settings and the compliance overview.
pub fn aircraft_router<S, B>(service: Arc<AircraftStatusService<S, B>>) -> Router
where
    S: MaintenanceRecordStore + 'static,
    B: BulletinFeed + 'static,
{
    Router::new()
        .route(
            "/api/v1/aircraft/:aircraft_id/limits",
            put(update_limits_handler::<S, B>),
        )
        .route(
            "/api/v1/aircraft/:aircraft_id/compliance",
            get(compliance_handler::<S, B>),
        )
        .with_state(service)
}

impl AircraftStatusError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AircraftStatusError::Store(StoreError::UnknownAircraft(_)) => StatusCode::NOT_FOUND,
            AircraftStatusError::Store(StoreError::InvalidField(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AircraftStatusError::Store(StoreError::Unavailable(_))
            | AircraftStatusError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

fn error_response(error: AircraftStatusError) -> Response {
    let payload = json!({ "error": error.to_string() });
    (error.status_code(), axum::Json(payload)).into_response()
}

pub(crate) async fn update_limits_handler<S, B>(
    State(service): State<Arc<AircraftStatusService<S, B>>>,
    Path(aircraft_id): Path<String>,
    axum::Json(inputs): axum::Json<LimitInputs>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    B: BulletinFeed + 'static,
{
    match service
        .update_limits(&AircraftId(aircraft_id), inputs)
        .await
    {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn compliance_handler<S, B>(
    State(service): State<Arc<AircraftStatusService<S, B>>>,
    Path(aircraft_id): Path<String>,
    Query(query): Query<ComplianceQuery>,
) -> Response
where
    S: MaintenanceRecordStore + 'static,
    B: BulletinFeed + 'static,
{
    match service
        .compliance_overview(&AircraftId(aircraft_id), query.as_of)
        .await
    {
        Ok(overview) => (StatusCode::OK, axum::Json(overview)).into_response(),
        Err(error) => error_response(error),
    }
}

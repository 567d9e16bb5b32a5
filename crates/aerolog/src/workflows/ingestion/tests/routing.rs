use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tokio::sync::Notify;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::ingestion::router::submit_handler;
use crate::workflows::ingestion::{
    ingestion_router, ExtractionError, ScanId, SubmitScanRequest, ACCOUNT_HEADER,
};

fn submit_body() -> Body {
    let request = SubmitScanRequest {
        aircraft_id: TAIL.to_string(),
        document_type: "maintenance report".to_string(),
        image: BASE64.encode(b"logbook page"),
    };
    Body::from(serde_json::to_vec(&request).expect("serialize request"))
}

fn submit_request() -> Request<Body> {
    Request::post("/api/v1/scans")
        .header(header::CONTENT_TYPE, "application/json")
        .header(ACCOUNT_HEADER, "acct-skyhawk")
        .body(submit_body())
        .expect("build request")
}

fn json_post(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(ACCOUNT_HEADER, "acct-skyhawk")
        .body(Body::from(payload.to_string()))
        .expect("build request")
}

fn empty_post(uri: &str) -> Request<Body> {
    Request::post(uri)
        .header(ACCOUNT_HEADER, "acct-skyhawk")
        .body(Body::empty())
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(ACCOUNT_HEADER, "acct-skyhawk")
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn submit_route_creates_extracted_scan() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());

    let response = router.oneshot(submit_request()).await.expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["state"], "extracted");
    assert!(body["scanId"]
        .as_str()
        .is_some_and(|id| id.starts_with("scan-")));
}

#[tokio::test]
async fn submit_handler_requires_account_header() {
    let h = default_harness();
    let request = SubmitScanRequest {
        aircraft_id: TAIL.to_string(),
        document_type: "invoice".to_string(),
        image: BASE64.encode(b"invoice"),
    };

    let response = submit_handler::<MemoryStore, ScriptedExtractor>(
        State(h.manager.clone()),
        HeaderMap::new(),
        axum::Json(request),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "invalid_input");
    assert_eq!(h.quota.status(&account()).reserved, 0);
}

#[tokio::test]
async fn submit_handler_rejects_invalid_base64() {
    let h = default_harness();
    let mut headers = HeaderMap::new();
    headers.insert(ACCOUNT_HEADER, HeaderValue::from_static("acct-skyhawk"));
    let request = SubmitScanRequest {
        aircraft_id: TAIL.to_string(),
        document_type: "invoice".to_string(),
        image: "not base64 at all!".to_string(),
    };

    let response = submit_handler::<MemoryStore, ScriptedExtractor>(
        State(h.manager.clone()),
        headers,
        axum::Json(request),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn exhausted_quota_maps_to_too_many_requests() {
    let h = harness(ScriptedExtractor::succeeding(), config(1));
    let router = ingestion_router(h.manager.clone());

    let first = router
        .clone()
        .oneshot(submit_request())
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router.oneshot(submit_request()).await.expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = read_json_body(second).await;
    assert_eq!(body["kind"], "quota_exceeded");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["periodEnd"], "2026-04-01T00:00:00Z");
}

#[tokio::test]
async fn extraction_failure_maps_to_bad_gateway() {
    let h = harness(
        ScriptedExtractor::failing(ExtractionError::Transport("connection reset".to_string())),
        config(10),
    );
    let router = ingestion_router(h.manager.clone());

    let response = router.oneshot(submit_request()).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json_body(response).await;
    assert_eq!(body["state"], "failed");
    assert_eq!(body["retryable"], true);
    assert!(body["scanId"].is_string());
}

#[tokio::test]
async fn extraction_failure_body_carries_actual_state() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        ScriptedExtractor::gated_failure(
            gate.clone(),
            ExtractionError::Transport("connection reset".to_string()),
        ),
        config(10),
    );
    let router = ingestion_router(h.manager.clone());

    let pending = tokio::spawn(router.oneshot(submit_request()));
    let scan_id = ScanId(first_scan_id(&h.manager).await);
    h.manager.reject(&scan_id).await.expect("reject succeeds");
    gate.notify_one();

    let response = pending.await.expect("task joined").expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json_body(response).await;
    assert_eq!(body["state"], "rejected");
    assert_eq!(body["scanId"], scan_id.0);
}

#[tokio::test]
async fn refused_apply_maps_to_unprocessable() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());
    let scan = h.manager.submit(submission()).await.expect("scan extracted");
    h.manager
        .begin_validation(&scan.id)
        .await
        .expect("validation opens");
    h.store.forget_aircraft(&aircraft());

    let response = router
        .oneshot(json_post(
            &format!("/api/v1/scans/{}/apply", scan.id),
            json!({ "validatedFields": { "magneto_hours": 0 } }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "record_rejected");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["state"], "validated");
}

#[tokio::test]
async fn review_apply_and_status_routes() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());
    let scan = h.manager.submit(submission()).await.expect("scan extracted");
    let base = format!("/api/v1/scans/{}", scan.id);

    let premature = router
        .clone()
        .oneshot(json_post(
            &format!("{base}/apply"),
            json!({ "validatedFields": { "magneto_hours": 0 } }),
        ))
        .await
        .expect("response");
    assert_eq!(premature.status(), StatusCode::CONFLICT);

    let sheet = router
        .clone()
        .oneshot(empty_post(&format!("{base}/validation")))
        .await
        .expect("response");
    assert_eq!(sheet.status(), StatusCode::OK);
    let sheet = read_json_body(sheet).await;
    assert_eq!(sheet["fields"].as_array().map(Vec::len), Some(2));
    assert_eq!(sheet["documentType"], "maintenance_report");

    h.store.fail_next_writes(1);
    let failed = router
        .clone()
        .oneshot(json_post(
            &format!("{base}/apply"),
            json!({ "validatedFields": { "magneto_hours": 0 } }),
        ))
        .await
        .expect("response");
    assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);
    let failed = read_json_body(failed).await;
    assert_eq!(failed["state"], "validated");

    let applied = router
        .clone()
        .oneshot(json_post(
            &format!("{base}/apply"),
            json!({ "validatedFields": { "magneto_hours": 0 } }),
        ))
        .await
        .expect("response");
    assert_eq!(applied.status(), StatusCode::OK);
    assert_eq!(read_json_body(applied).await["state"], "applied");

    let summary = router
        .clone()
        .oneshot(get(&base))
        .await
        .expect("response");
    assert_eq!(summary.status(), StatusCode::OK);
    let summary = read_json_body(summary).await;
    assert_eq!(summary["state"], "applied");
    assert!(summary["appliedRecord"].is_string());

    let quota = router
        .oneshot(get("/api/v1/quota/status"))
        .await
        .expect("response");
    assert_eq!(quota.status(), StatusCode::OK);
    let quota = read_json_body(quota).await;
    assert_eq!(quota["consumed"], 1);
    assert_eq!(quota["ceiling"], 10);
}

#[tokio::test]
async fn reject_route_and_terminal_conflict() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());
    let scan = h.manager.submit(submission()).await.expect("scan extracted");
    let uri = format!("/api/v1/scans/{}/reject", scan.id);

    let rejected = router
        .clone()
        .oneshot(empty_post(&uri))
        .await
        .expect("response");
    assert_eq!(rejected.status(), StatusCode::OK);
    assert_eq!(read_json_body(rejected).await["state"], "rejected");

    let again = router.oneshot(empty_post(&uri)).await.expect("response");
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let body = read_json_body(again).await;
    assert_eq!(body["kind"], "invalid_state_transition");
}

#[tokio::test]
async fn unknown_scan_maps_to_not_found() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());

    let response = router
        .oneshot(get("/api/v1/scans/scan-999999"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_route_lists_aircraft_scans() {
    let h = default_harness();
    let router = ingestion_router(h.manager.clone());
    h.manager.submit(submission()).await.expect("scan extracted");

    let response = router
        .oneshot(get(&format!("/api/v1/aircraft/{TAIL}/scans")))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let entries = body.as_array().expect("history array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["aircraftId"], TAIL);
    assert_eq!(entries[0]["fieldCount"], 2);
}

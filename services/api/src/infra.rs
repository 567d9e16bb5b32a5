use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use aerolog::clock::Clock;
use aerolog::workflows::ingestion::{
    ExtractedField, ExtractedFields, ExtractionError, Scan, ScanId, ScanState, ValidatedFields,
    VisionExtractor,
};
use aerolog::workflows::maintenance::{
    Aircraft, AircraftId, BulletinError, BulletinFeed, DocumentType, LimitUpdate,
    MaintenanceLimitsSnapshot, MaintenanceRecord, MaintenanceRecordStore, RecordId, StoreError,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// One row of the scan history log kept by the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistoryEntry {
    pub(crate) scan_id: ScanId,
    pub(crate) aircraft_id: AircraftId,
    pub(crate) state: ScanState,
    pub(crate) at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreState {
    aircraft: HashMap<AircraftId, Aircraft>,
    limits: HashMap<AircraftId, MaintenanceLimitsSnapshot>,
    records: Vec<MaintenanceRecord>,
    history: Vec<HistoryEntry>,
}

/// Record store for local runs. One lock covers every table so an apply lands as a unit.
///
/// Saving limits for an aircraft registers it; applying scan fields requires it to be known.
pub(crate) struct InMemoryMaintenanceStore {
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

impl InMemoryMaintenanceStore {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub(crate) fn register_aircraft(&self, aircraft: Aircraft) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.aircraft.insert(aircraft.id.clone(), aircraft);
    }

    pub(crate) fn records(&self, aircraft_id: &AircraftId) -> Vec<MaintenanceRecord> {
        let state = self.state.lock().expect("store mutex poisoned");
        state
            .records
            .iter()
            .filter(|record| &record.aircraft_id == aircraft_id)
            .cloned()
            .collect()
    }

    pub(crate) fn history(&self) -> Vec<HistoryEntry> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .history
            .clone()
    }
}

#[async_trait]
impl MaintenanceRecordStore for InMemoryMaintenanceStore {
    async fn aircraft_exists(&self, aircraft_id: &AircraftId) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.aircraft.contains_key(aircraft_id))
    }

    async fn limits_snapshot(
        &self,
        aircraft_id: &AircraftId,
    ) -> Result<Option<MaintenanceLimitsSnapshot>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.limits.get(aircraft_id).cloned())
    }

    async fn save_limits(
        &self,
        snapshot: MaintenanceLimitsSnapshot,
    ) -> Result<MaintenanceLimitsSnapshot, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let aircraft_id = snapshot.aircraft_id.clone();
        state
            .aircraft
            .entry(aircraft_id.clone())
            .or_insert_with(|| Aircraft {
                id: aircraft_id.clone(),
                registration: aircraft_id.0.clone(),
            });
        state.limits.insert(aircraft_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn apply_validated_fields(
        &self,
        aircraft_id: &AircraftId,
        source_scan: &ScanId,
        document_type: DocumentType,
        fields: &ValidatedFields,
    ) -> Result<MaintenanceRecord, StoreError> {
        let update = LimitUpdate::from_fields(fields)?;
        let now = self.clock.now();

        let mut state = self.state.lock().expect("store mutex poisoned");
        if !state.aircraft.contains_key(aircraft_id) {
            return Err(StoreError::UnknownAircraft(aircraft_id.clone()));
        }

        if !update.is_empty() {
            let snapshot = state
                .limits
                .entry(aircraft_id.clone())
                .or_insert_with(|| MaintenanceLimitsSnapshot::empty(aircraft_id.clone(), now));
            update.apply_to(&mut snapshot.inputs);
            snapshot.updated_at = now;
        }

        let sequence = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let record = MaintenanceRecord {
            id: RecordId(format!("rec-{sequence:06}")),
            aircraft_id: aircraft_id.clone(),
            source_scan: source_scan.clone(),
            document_type,
            fields: fields.0.clone(),
            recorded_at: now,
        };
        state.records.push(record.clone());
        debug!(
            aircraft = %aircraft_id,
            record_id = %record.id,
            scan_id = %source_scan,
            limit_changes = update.len(),
            "maintenance record stored"
        );
        Ok(record)
    }

    async fn record_scan_history_entry(&self, scan: &Scan) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.history.push(HistoryEntry {
            scan_id: scan.id.clone(),
            aircraft_id: scan.aircraft_id.clone(),
            state: scan.state,
            at: scan.updated_at,
        });
        Ok(())
    }
}

/// Bulletin feed backed by a set of flagged tail numbers.
#[derive(Default)]
pub(crate) struct InMemoryBulletinFeed {
    flagged: Mutex<HashSet<AircraftId>>,
}

impl InMemoryBulletinFeed {
    pub(crate) fn flag(&self, aircraft_id: AircraftId) {
        self.flagged
            .lock()
            .expect("bulletin mutex poisoned")
            .insert(aircraft_id);
    }
}

#[async_trait]
impl BulletinFeed for InMemoryBulletinFeed {
    async fn has_new_reference_item(
        &self,
        aircraft_id: &AircraftId,
    ) -> Result<bool, BulletinError> {
        let flagged = self.flagged.lock().expect("bulletin mutex poisoned");
        Ok(flagged.contains(aircraft_id))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionRequest<'a> {
    document_type: &'a str,
    image: String,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    fields: BTreeMap<String, ExtractedField>,
}

/// Vision collaborator reached over HTTP. Posts the image as base64 JSON.
pub(crate) struct HttpVisionExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVisionExtractor {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl VisionExtractor for HttpVisionExtractor {
    async fn extract(
        &self,
        image: &[u8],
        hint: DocumentType,
    ) -> Result<ExtractedFields, ExtractionError> {
        let payload = ExtractionRequest {
            document_type: hint.label(),
            image: BASE64.encode(image),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Unsupported(body));
        }
        if !status.is_success() {
            return Err(ExtractionError::Transport(format!(
                "vision service responded with {}",
                status.as_u16()
            )));
        }

        let body: ExtractionResponse = response
            .json()
            .await
            .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
        if body.fields.is_empty() {
            return Err(ExtractionError::Unsupported(
                "no fields recognised in document".to_string(),
            ));
        }
        Ok(ExtractedFields(body.fields))
    }
}

/// Offline extractor returning a fixed field set per document type.
#[derive(Debug, Default)]
pub(crate) struct CannedVisionExtractor;

#[async_trait]
impl VisionExtractor for CannedVisionExtractor {
    async fn extract(
        &self,
        image: &[u8],
        hint: DocumentType,
    ) -> Result<ExtractedFields, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::Unsupported("empty image".to_string()));
        }
        Ok(canned_fields(hint))
    }
}

pub(crate) fn canned_fields(hint: DocumentType) -> ExtractedFields {
    let entries: &[(&str, serde_json::Value, f32)] = match hint {
        DocumentType::MaintenanceReport => &[
            ("work_performed", json!("500 hr magneto inspection"), 0.82),
            ("magneto_hours", json!(0), 0.91),
            ("engine_hours", json!("1,212.4"), 0.77),
            ("mechanic", json!("A&P 3318204"), 0.64),
        ],
        DocumentType::Invoice => &[
            ("vendor", json!("Tri-County Avionics"), 0.88),
            ("total", json!("1,845.00"), 0.93),
            ("avionics_date", json!("2026-01-20"), 0.72),
        ],
        DocumentType::Stc => &[
            ("stc_number", json!("SA02012CH"), 0.86),
            ("holder", json!("Electroair"), 0.79),
        ],
        DocumentType::Other => &[("text", json!("unclassified page"), 0.5)],
    };

    let fields = entries
        .iter()
        .map(|(name, value, confidence)| {
            (
                name.to_string(),
                ExtractedField {
                    value: value.clone(),
                    confidence: Some(*confidence),
                },
            )
        })
        .collect();
    ExtractedFields(fields)
}

/// Extractor chosen at startup: HTTP when an endpoint is configured, canned otherwise.
pub(crate) enum ConfiguredExtractor {
    Http(HttpVisionExtractor),
    Canned(CannedVisionExtractor),
}

impl ConfiguredExtractor {
    pub(crate) fn from_endpoint(endpoint: Option<&str>) -> Self {
        match endpoint {
            Some(endpoint) => Self::Http(HttpVisionExtractor::new(endpoint)),
            None => Self::Canned(CannedVisionExtractor),
        }
    }

    pub(crate) fn is_canned(&self) -> bool {
        matches!(self, Self::Canned(_))
    }
}

#[async_trait]
impl VisionExtractor for ConfiguredExtractor {
    async fn extract(
        &self,
        image: &[u8],
        hint: DocumentType,
    ) -> Result<ExtractedFields, ExtractionError> {
        match self {
            Self::Http(extractor) => extractor.extract(image, hint).await,
            Self::Canned(extractor) => extractor.extract(image, hint).await,
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::clock::ManualClock;
use crate::config::IngestionConfig;
use crate::workflows::ingestion::extraction::{ExtractionError, VisionExtractor};
use crate::workflows::ingestion::{
    AccountId, ExtractedField, ExtractedFields, QuotaLedger, Scan, ScanId, ScanLifecycleManager,
    ScanSubmission, ValidatedFields,
};
use crate::workflows::maintenance::{
    AircraftId, DocumentType, LimitUpdate, MaintenanceLimitsSnapshot, MaintenanceRecord,
    MaintenanceRecordStore, RecordId, StoreError,
};

pub(super) const TAIL: &str = "N4512K";

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0)
        .single()
        .expect("valid start instant")
}

pub(super) fn account() -> AccountId {
    AccountId("acct-skyhawk".to_string())
}

pub(super) fn aircraft() -> AircraftId {
    AircraftId(TAIL.to_string())
}

pub(super) fn submission() -> ScanSubmission {
    ScanSubmission {
        account_id: account(),
        aircraft_id: aircraft(),
        document_type: "maintenance_report".to_string(),
        image: b"\x89PNG fake logbook page".to_vec(),
    }
}

pub(super) fn extracted_fields() -> ExtractedFields {
    let mut fields = BTreeMap::new();
    fields.insert(
        "magneto_hours".to_string(),
        ExtractedField {
            value: json!(120),
            confidence: Some(0.93),
        },
    );
    fields.insert(
        "work_performed".to_string(),
        ExtractedField {
            value: json!("500 hr magneto inspection"),
            confidence: Some(0.71),
        },
    );
    ExtractedFields(fields)
}

pub(super) fn validated_fields() -> ValidatedFields {
    let mut fields = BTreeMap::new();
    fields.insert("magneto_hours".to_string(), json!(0));
    fields.insert(
        "work_performed".to_string(),
        json!("500 hr magneto inspection"),
    );
    ValidatedFields(fields)
}

pub(super) fn config(ceiling: u32) -> IngestionConfig {
    IngestionConfig {
        quota_ceiling: ceiling,
        extraction_timeout: Duration::from_millis(200),
        store_timeout: Duration::from_millis(200),
        vision_endpoint: None,
    }
}

pub(super) struct Harness<V> {
    pub(super) manager: Arc<ScanLifecycleManager<MemoryStore, V>>,
    pub(super) extractor: Arc<V>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) quota: Arc<QuotaLedger>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn harness<V>(extractor: V, ingestion: IngestionConfig) -> Harness<V>
where
    V: VisionExtractor + 'static,
{
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(MemoryStore::with_aircraft(aircraft()));
    let quota = Arc::new(QuotaLedger::new(ingestion.quota_ceiling, clock.clone()));
    let extractor = Arc::new(extractor);
    let manager = Arc::new(ScanLifecycleManager::new(
        store.clone(),
        extractor.clone(),
        quota.clone(),
        clock.clone(),
        ingestion,
    ));
    Harness {
        manager,
        extractor,
        store,
        quota,
        clock,
    }
}

pub(super) fn default_harness() -> Harness<ScriptedExtractor> {
    harness(ScriptedExtractor::succeeding(), config(10))
}

/// Record store kept in memory, with switches for failure and latency.
#[derive(Default)]
pub(super) struct MemoryStore {
    aircraft: Mutex<Vec<AircraftId>>,
    limits: Mutex<HashMap<AircraftId, MaintenanceLimitsSnapshot>>,
    records: Mutex<Vec<MaintenanceRecord>>,
    history: Mutex<Vec<(String, String)>>,
    failures_remaining: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
    lookups_offline: AtomicBool,
}

impl MemoryStore {
    pub(super) fn with_aircraft(aircraft_id: AircraftId) -> Self {
        let store = Self::default();
        store
            .aircraft
            .lock()
            .expect("store mutex poisoned")
            .push(aircraft_id);
        store
    }

    pub(super) fn forget_aircraft(&self, aircraft_id: &AircraftId) {
        self.aircraft
            .lock()
            .expect("store mutex poisoned")
            .retain(|known| known != aircraft_id);
    }

    pub(super) fn take_lookups_offline(&self) {
        self.lookups_offline.store(true, Ordering::SeqCst);
    }

    pub(super) fn fail_next_writes(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub(super) fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock().expect("store mutex poisoned") = Some(delay);
    }

    pub(super) fn records(&self) -> Vec<MaintenanceRecord> {
        self.records.lock().expect("store mutex poisoned").clone()
    }

    pub(super) fn history_states(&self, scan_id: &str) -> Vec<String> {
        self.history
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|(id, _)| id == scan_id)
            .map(|(_, state)| state.clone())
            .collect()
    }

    pub(super) fn limits(&self, aircraft_id: &AircraftId) -> Option<MaintenanceLimitsSnapshot> {
        self.limits
            .lock()
            .expect("store mutex poisoned")
            .get(aircraft_id)
            .cloned()
    }
}

#[async_trait]
impl MaintenanceRecordStore for MemoryStore {
    async fn aircraft_exists(&self, aircraft_id: &AircraftId) -> Result<bool, StoreError> {
        if self.lookups_offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("registry offline".to_string()));
        }
        Ok(self
            .aircraft
            .lock()
            .expect("store mutex poisoned")
            .contains(aircraft_id))
    }

    async fn limits_snapshot(
        &self,
        aircraft_id: &AircraftId,
    ) -> Result<Option<MaintenanceLimitsSnapshot>, StoreError> {
        Ok(self.limits(aircraft_id))
    }

    async fn save_limits(
        &self,
        snapshot: MaintenanceLimitsSnapshot,
    ) -> Result<MaintenanceLimitsSnapshot, StoreError> {
        self.limits
            .lock()
            .expect("store mutex poisoned")
            .insert(snapshot.aircraft_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn apply_validated_fields(
        &self,
        aircraft_id: &AircraftId,
        source_scan: &ScanId,
        document_type: DocumentType,
        fields: &ValidatedFields,
    ) -> Result<MaintenanceRecord, StoreError> {
        let delay = *self.write_delay.lock().expect("store mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("primary offline".to_string()));
        }

        if !self
            .aircraft
            .lock()
            .expect("store mutex poisoned")
            .contains(aircraft_id)
        {
            return Err(StoreError::UnknownAircraft(aircraft_id.clone()));
        }

        let update = LimitUpdate::from_fields(fields)?;
        let now = start();
        let mut limits = self.limits.lock().expect("store mutex poisoned");
        let snapshot = limits
            .entry(aircraft_id.clone())
            .or_insert_with(|| MaintenanceLimitsSnapshot::empty(aircraft_id.clone(), now));
        update.apply_to(&mut snapshot.inputs);
        snapshot.updated_at = now;

        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = MaintenanceRecord {
            id: RecordId(format!("rec-{}", records.len() + 1)),
            aircraft_id: aircraft_id.clone(),
            source_scan: source_scan.clone(),
            document_type,
            fields: fields.0.clone(),
            recorded_at: now,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn record_scan_history_entry(&self, scan: &Scan) -> Result<(), StoreError> {
        self.history
            .lock()
            .expect("store mutex poisoned")
            .push((scan.id.0.clone(), scan.state.label().to_string()));
        Ok(())
    }
}

/// Extractor returning a fixed outcome, optionally after a delay or an explicit release.
pub(super) struct ScriptedExtractor {
    outcome: Result<ExtractedFields, ExtractionError>,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub(super) fn succeeding() -> Self {
        Self {
            outcome: Ok(extracted_fields()),
            delay: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn failing(error: ExtractionError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::succeeding()
        }
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::succeeding()
        }
    }

    pub(super) fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::succeeding()
        }
    }

    pub(super) fn gated_failure(gate: Arc<Notify>, error: ExtractionError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::gated(gate)
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _image: &[u8],
        _hint: DocumentType,
    ) -> Result<ExtractedFields, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

/// Wait until a scan for the aircraft shows up in the manager's history.
pub(super) async fn first_scan_id<V>(manager: &ScanLifecycleManager<MemoryStore, V>) -> String
where
    V: VisionExtractor + 'static,
{
    for _ in 0..1_000 {
        if let Some(summary) = manager.history(&aircraft()).await.into_iter().next() {
            return summary.scan_id.0;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("scan never registered");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

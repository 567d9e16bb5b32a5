use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as ScanLock;
use tokio::time::timeout;
use tracing::{info, warn};

use super::domain::{
    AccountId, ReviewSheet, Scan, ScanId, ScanState, ScanSubmission, ScanSummary, ValidatedFields,
};
use super::extraction::{ExtractionError, VisionExtractor};
use super::quota::{QuotaError, QuotaLedger, QuotaStatus};
use crate::clock::Clock;
use crate::config::IngestionConfig;
use crate::workflows::maintenance::{
    AircraftId, DocumentType, LimitUpdate, MaintenanceRecordStore, StoreError,
};

/// Drives each scan through submission, extraction, human validation, and
/// application to the record store.
///
/// Scans live behind their own async lock so transitions on one scan are applied in
/// order by a single writer, while unrelated scans proceed independently.
pub struct ScanLifecycleManager<S, V> {
    store: Arc<S>,
    extractor: Arc<V>,
    quota: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    config: IngestionConfig,
    scans: Mutex<HashMap<ScanId, Arc<ScanLock<Scan>>>>,
}

static SCAN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_scan_id() -> ScanId {
    let id = SCAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ScanId(format!("scan-{id:06}"))
}

impl<S, V> ScanLifecycleManager<S, V>
where
    S: MaintenanceRecordStore + 'static,
    V: VisionExtractor + 'static,
{
    pub fn new(
        store: Arc<S>,
        extractor: Arc<V>,
        quota: Arc<QuotaLedger>,
        clock: Arc<dyn Clock>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            quota,
            clock,
            config,
            scans: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a credit, create the scan, and run extraction.
    ///
    /// The aircraft must be known to the record store before any credit is reserved.
    /// Extraction failures release the reservation and are not retried here; callers
    /// retry with a fresh submission.
    pub async fn submit(&self, submission: ScanSubmission) -> Result<Scan, ScanError> {
        let ScanSubmission {
            account_id,
            aircraft_id,
            document_type,
            image,
        } = submission;

        let document_type = DocumentType::parse(&document_type).ok_or_else(|| {
            ScanError::InvalidInput(format!("unsupported document type '{document_type}'"))
        })?;
        if aircraft_id.0.trim().is_empty() {
            return Err(ScanError::InvalidInput("aircraft id is required".to_string()));
        }
        if image.is_empty() {
            return Err(ScanError::InvalidInput("document image is empty".to_string()));
        }

        self.ensure_aircraft(&aircraft_id).await?;

        let reservation = self.quota.reserve(&account_id)?;

        let now = self.clock.now();
        let mut scan = Scan::new(
            next_scan_id(),
            account_id,
            aircraft_id,
            document_type,
            now,
        );
        transition(&mut scan, ScanState::Extracting, now)?;
        let scan_id = scan.id.clone();
        let handle = Arc::new(ScanLock::new(scan));
        self.scans
            .lock()
            .expect("scan registry mutex poisoned")
            .insert(scan_id.clone(), handle.clone());

        info!(
            scan_id = %scan_id,
            document_type = %document_type,
            "scan submitted; extraction started"
        );

        let limit = self.config.extraction_timeout;
        let outcome = match timeout(limit, self.extractor.extract(&image, document_type)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        let mut scan = handle.lock().await;
        let now = self.clock.now();

        match outcome {
            Ok(fields) => {
                // A rejection that raced the extraction still consumes the credit.
                if let Err(err) = self.quota.commit(reservation) {
                    warn!(
                        scan_id = %scan_id,
                        error = %err,
                        "extraction result dropped; quota commit refused"
                    );
                    if scan.state == ScanState::Extracting {
                        scan.failure = Some(err.to_string());
                        transition(&mut scan, ScanState::Failed, now)?;
                        self.record_history(&scan).await;
                    }
                    return Err(err.into());
                }
                transition(&mut scan, ScanState::Extracted, now)?;
                info!(scan_id = %scan_id, fields = fields.len(), "extraction complete");
                scan.extracted = Some(fields);
                self.record_history(&scan).await;
                Ok(scan.clone())
            }
            Err(source) => {
                self.quota.release(reservation)?;
                warn!(
                    scan_id = %scan_id,
                    error = %source,
                    "extraction failed; reservation released"
                );
                if scan.state == ScanState::Extracting {
                    scan.failure = Some(source.to_string());
                    transition(&mut scan, ScanState::Failed, now)?;
                    self.record_history(&scan).await;
                }
                Err(ScanError::ExtractionFailed {
                    scan_id,
                    state: scan.state,
                    source,
                })
            }
        }
    }

    /// Open (or re-open) the human review of extracted fields.
    pub async fn begin_validation(&self, scan_id: &ScanId) -> Result<ReviewSheet, ScanError> {
        let handle = self.handle(scan_id)?;
        let mut scan = handle.lock().await;

        if scan.state != ScanState::Validating {
            let now = self.clock.now();
            transition(&mut scan, ScanState::Validating, now)?;
            info!(scan_id = %scan_id, "validation started");
        }

        Ok(scan.review_sheet())
    }

    /// Commit human-approved fields to the record store.
    ///
    /// On a store failure or timeout the scan stays `validated` so the caller can retry
    /// without re-extracting or spending quota. A write the store refuses outright
    /// (unknown aircraft, unusable field) also leaves it `validated` but is reported as
    /// [`ScanError::RecordRejected`].
    pub async fn apply(
        &self,
        scan_id: &ScanId,
        validated: ValidatedFields,
    ) -> Result<Scan, ScanError> {
        let handle = self.handle(scan_id)?;
        let mut scan = handle.lock().await;

        if !matches!(scan.state, ScanState::Validating | ScanState::Validated) {
            return Err(ScanError::InvalidStateTransition {
                scan_id: scan_id.clone(),
                from: scan.state,
                to: ScanState::Applied,
            });
        }
        if validated.is_empty() {
            return Err(ScanError::InvalidInput(
                "validated payload has no fields".to_string(),
            ));
        }
        LimitUpdate::from_fields(&validated)
            .map_err(|err| ScanError::InvalidInput(err.to_string()))?;

        let now = self.clock.now();
        if scan.state == ScanState::Validating {
            transition(&mut scan, ScanState::Validated, now)?;
        }
        scan.validated = Some(validated.clone());
        scan.updated_at = now;

        let limit = self.config.store_timeout;
        let write = timeout(
            limit,
            self.store.apply_validated_fields(
                &scan.aircraft_id,
                scan_id,
                scan.document_type,
                &validated,
            ),
        )
        .await;

        let reason = match write {
            Ok(Ok(record)) => {
                let now = self.clock.now();
                transition(&mut scan, ScanState::Applied, now)?;
                scan.failure = None;
                info!(scan_id = %scan_id, record_id = %record.id, "validated fields applied");
                scan.applied_record = Some(record.id);
                self.record_history(&scan).await;
                return Ok(scan.clone());
            }
            Ok(Err(err)) if !err.is_transient() => {
                let reason = err.to_string();
                warn!(scan_id = %scan_id, error = %reason, "apply refused by record store");
                scan.failure = Some(reason.clone());
                return Err(ScanError::RecordRejected {
                    scan_id: scan_id.clone(),
                    reason,
                });
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("record store timed out after {} ms", limit.as_millis()),
        };

        warn!(scan_id = %scan_id, error = %reason, "apply failed; scan left validated");
        scan.failure = Some(reason.clone());
        Err(ScanError::RecordStoreWriteFailed {
            scan_id: scan_id.clone(),
            reason,
        })
    }

    /// Discard a scan. No store write and no quota refund.
    pub async fn reject(&self, scan_id: &ScanId) -> Result<Scan, ScanError> {
        let handle = self.handle(scan_id)?;
        let mut scan = handle.lock().await;

        let now = self.clock.now();
        transition(&mut scan, ScanState::Rejected, now)?;
        info!(scan_id = %scan_id, "scan rejected");
        self.record_history(&scan).await;
        Ok(scan.clone())
    }

    pub async fn get(&self, scan_id: &ScanId) -> Result<Scan, ScanError> {
        let handle = self.handle(scan_id)?;
        let scan = handle.lock().await;
        Ok(scan.clone())
    }

    /// Scans for an aircraft, newest first.
    pub async fn history(&self, aircraft_id: &AircraftId) -> Vec<ScanSummary> {
        let handles: Vec<_> = self
            .scans
            .lock()
            .expect("scan registry mutex poisoned")
            .values()
            .cloned()
            .collect();

        let mut summaries = Vec::new();
        for handle in handles {
            let scan = handle.lock().await;
            if &scan.aircraft_id == aircraft_id {
                summaries.push(scan.summary());
            }
        }

        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.scan_id.cmp(&a.scan_id))
        });
        summaries
    }

    pub fn quota_status(&self, account_id: &AccountId) -> QuotaStatus {
        self.quota.status(account_id)
    }

    fn handle(&self, scan_id: &ScanId) -> Result<Arc<ScanLock<Scan>>, ScanError> {
        self.scans
            .lock()
            .expect("scan registry mutex poisoned")
            .get(scan_id)
            .cloned()
            .ok_or_else(|| ScanError::NotFound(scan_id.clone()))
    }

    async fn ensure_aircraft(&self, aircraft_id: &AircraftId) -> Result<(), ScanError> {
        let limit = self.config.store_timeout;
        match timeout(limit, self.store.aircraft_exists(aircraft_id)).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(ScanError::InvalidInput(
                StoreError::UnknownAircraft(aircraft_id.clone()).to_string(),
            )),
            Ok(Err(err)) => Err(ScanError::StoreUnavailable(err.to_string())),
            Err(_) => Err(ScanError::StoreUnavailable(format!(
                "aircraft lookup timed out after {} ms",
                limit.as_millis()
            ))),
        }
    }

    async fn record_history(&self, scan: &Scan) {
        let result = timeout(
            self.config.store_timeout,
            self.store.record_scan_history_entry(scan),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                scan_id = %scan.id,
                state = %scan.state,
                error = %err,
                "scan history entry not recorded"
            ),
            Err(_) => warn!(
                scan_id = %scan.id,
                state = %scan.state,
                "scan history entry timed out"
            ),
        }
    }
}

fn transition(scan: &mut Scan, next: ScanState, at: DateTime<Utc>) -> Result<(), ScanError> {
    scan.transition(next, at)
        .map_err(|(from, to)| ScanError::InvalidStateTransition {
            scan_id: scan.id.clone(),
            from,
            to,
        })
}

/// Error raised by the scan lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan quota exhausted for account {account_id} ({ceiling} per period, resets {period_end})")]
    QuotaExceeded {
        account_id: AccountId,
        ceiling: u32,
        period_end: DateTime<Utc>,
    },
    #[error("extraction failed for scan {scan_id}: {source}")]
    ExtractionFailed {
        scan_id: ScanId,
        /// `failed`, or `rejected` when a rejection landed during extraction.
        state: ScanState,
        #[source]
        source: ExtractionError,
    },
    #[error("scan {scan_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        scan_id: ScanId,
        from: ScanState,
        to: ScanState,
    },
    #[error("record store write failed for scan {scan_id}: {reason}")]
    RecordStoreWriteFailed { scan_id: ScanId, reason: String },
    #[error("record store refused fields for scan {scan_id}: {reason}")]
    RecordRejected { scan_id: ScanId, reason: String },
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("scan {0} not found")]
    NotFound(ScanId),
    #[error(transparent)]
    Quota(QuotaError),
}

impl ScanError {
    pub const fn kind(&self) -> &'static str {
        match self {
            ScanError::QuotaExceeded { .. } => "quota_exceeded",
            ScanError::ExtractionFailed { .. } => "extraction_failed",
            ScanError::InvalidStateTransition { .. } => "invalid_state_transition",
            ScanError::RecordStoreWriteFailed { .. } => "record_store_write_failed",
            ScanError::RecordRejected { .. } => "record_rejected",
            ScanError::StoreUnavailable(_) => "store_unavailable",
            ScanError::InvalidInput(_) => "invalid_input",
            ScanError::NotFound(_) => "not_found",
            ScanError::Quota(_) => "quota_bookkeeping",
        }
    }

    /// Whether repeating the request (a new submission, or the same apply) can succeed
    /// without waiting for a quota period reset.
    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            ScanError::ExtractionFailed { .. }
                | ScanError::RecordStoreWriteFailed { .. }
                | ScanError::StoreUnavailable(_)
        )
    }
}

impl From<QuotaError> for ScanError {
    fn from(value: QuotaError) -> Self {
        match value {
            QuotaError::Exceeded {
                account_id,
                ceiling,
                period_end,
            } => ScanError::QuotaExceeded {
                account_id,
                ceiling,
                period_end,
            },
            other => ScanError::Quota(other),
        }
    }
}


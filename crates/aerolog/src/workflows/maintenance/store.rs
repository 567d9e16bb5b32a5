use async_trait::async_trait;

use super::domain::{AircraftId, DocumentType, MaintenanceLimitsSnapshot, MaintenanceRecord};
use crate::workflows::ingestion::{Scan, ScanId, ValidatedFields};

/// System of record for aircraft maintenance facts.
///
/// Implementations own their storage engine; the core only depends on this contract.
/// `apply_validated_fields` must be atomic: either every field (including any limit
/// inputs reconciled from it) is committed or nothing is.
#[async_trait]
pub trait MaintenanceRecordStore: Send + Sync {
    async fn aircraft_exists(&self, aircraft_id: &AircraftId) -> Result<bool, StoreError>;

    async fn limits_snapshot(
        &self,
        aircraft_id: &AircraftId,
    ) -> Result<Option<MaintenanceLimitsSnapshot>, StoreError>;

    async fn save_limits(
        &self,
        snapshot: MaintenanceLimitsSnapshot,
    ) -> Result<MaintenanceLimitsSnapshot, StoreError>;

    async fn apply_validated_fields(
        &self,
        aircraft_id: &AircraftId,
        source_scan: &ScanId,
        document_type: DocumentType,
        fields: &ValidatedFields,
    ) -> Result<MaintenanceRecord, StoreError>;

    async fn record_scan_history_entry(&self, scan: &Scan) -> Result<(), StoreError>;
}

/// Error enumeration for record store failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("aircraft {0} is not registered")]
    UnknownAircraft(AircraftId),
    #[error("rejected field: {0}")]
    InvalidField(#[from] super::reconcile::FieldError),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the same write can succeed later. Unknown aircraft and rejected fields
    /// are permanent for a given payload.
    pub const fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

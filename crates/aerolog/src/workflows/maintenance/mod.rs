//! Maintenance record contract, limits settings, and the compliance overview.

pub mod bulletins;
pub mod domain;
pub mod reconcile;
pub mod router;
pub mod service;
pub mod store;


pub use bulletins::{BulletinError, BulletinFeed};
pub use domain::{
    Aircraft, AircraftId, DocumentType, LimitInputs, LimitPolicy, MaintenanceLimitsSnapshot,
    MaintenanceRecord, RecordId,
};
pub use reconcile::{FieldError, LimitUpdate};
pub use router::aircraft_router;
pub use service::{AircraftStatusError, AircraftStatusService, ComplianceOverview};
pub use store::{MaintenanceRecordStore, StoreError};

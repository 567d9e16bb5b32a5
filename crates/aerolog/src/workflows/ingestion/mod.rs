//! Scan intake: quota gating, vision extraction, human validation, and
//! reconciliation of validated fields into the maintenance record.

pub mod domain;
pub mod extraction;
pub mod quota;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AccountId, ExtractedField, ExtractedFields, ReviewField, ReviewSheet, Scan, ScanId, ScanState,
    ScanSubmission, ScanSummary, ValidatedFields,
};
pub use extraction::{ExtractionError, VisionExtractor};
pub use quota::{QuotaError, QuotaLedger, QuotaStatus, ReservationToken};
pub use router::{
    ingestion_router, ApplyScanRequest, ScanStateView, SubmitScanRequest, ACCOUNT_HEADER,
};
pub use service::{ScanError, ScanLifecycleManager};

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::maintenance::{AircraftId, DocumentType, RecordId};

/// Identifier wrapper for a document scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub String);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account that owns the scan quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a single ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Submitted,
    Extracting,
    Extracted,
    Validating,
    Validated,
    Applied,
    Rejected,
    Failed,
}

impl ScanState {
    pub const fn label(self) -> &'static str {
        match self {
            ScanState::Submitted => "submitted",
            ScanState::Extracting => "extracting",
            ScanState::Extracted => "extracted",
            ScanState::Validating => "validating",
            ScanState::Validated => "validated",
            ScanState::Applied => "applied",
            ScanState::Rejected => "rejected",
            ScanState::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanState::Applied | ScanState::Rejected | ScanState::Failed
        )
    }

    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;

        if next == Rejected {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Submitted, Extracting)
                | (Extracting, Extracted)
                | (Extracting, Failed)
                | (Extracted, Validating)
                | (Validating, Validated)
                | (Validated, Applied)
        )
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One field as returned by the vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Raw structured payload from the vision collaborator, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields(pub BTreeMap<String, ExtractedField>);

impl ExtractedFields {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Human-approved field values; may add, drop, or edit extracted fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedFields(pub BTreeMap<String, Value>);

impl ValidatedFields {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inbound request to ingest a document image.
#[derive(Debug, Clone)]
pub struct ScanSubmission {
    pub account_id: AccountId,
    pub aircraft_id: AircraftId,
    pub document_type: String,
    pub image: Vec<u8>,
}

/// Scan record owned by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: ScanId,
    pub account_id: AccountId,
    pub aircraft_id: AircraftId,
    pub document_type: DocumentType,
    pub state: ScanState,
    pub extracted: Option<ExtractedFields>,
    pub validated: Option<ValidatedFields>,
    pub applied_record: Option<RecordId>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    pub(crate) fn new(
        id: ScanId,
        account_id: AccountId,
        aircraft_id: AircraftId,
        document_type: DocumentType,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            aircraft_id,
            document_type,
            state: ScanState::Submitted,
            extracted: None,
            validated: None,
            applied_record: None,
            failure: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Move to `next`, or report the attempted transition unchanged.
    pub(crate) fn transition(
        &mut self,
        next: ScanState,
        at: DateTime<Utc>,
    ) -> Result<(), (ScanState, ScanState)> {
        if !self.state.can_transition_to(next) {
            return Err((self.state, next));
        }
        self.state = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            scan_id: self.id.clone(),
            aircraft_id: self.aircraft_id.clone(),
            document_type: self.document_type,
            state: self.state,
            field_count: self.extracted.as_ref().map(ExtractedFields::len).unwrap_or(0),
            applied_record: self.applied_record.clone(),
            failure: self.failure.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn review_sheet(&self) -> ReviewSheet {
        let fields = self
            .extracted
            .as_ref()
            .map(|extracted| {
                extracted
                    .0
                    .iter()
                    .map(|(name, field)| ReviewField {
                        name: name.clone(),
                        value: field.value.clone(),
                        confidence: field.confidence,
                    })
                    .collect()
            })
            .unwrap_or_default();

        ReviewSheet {
            scan_id: self.id.clone(),
            document_type: self.document_type,
            fields,
        }
    }
}

/// History and status view of a scan without its payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub aircraft_id: AircraftId,
    pub document_type: DocumentType,
    pub state: ScanState,
    pub field_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_record: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Extracted fields shaped for human review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSheet {
    pub scan_id: ScanId,
    pub document_type: DocumentType,
    pub fields: Vec<ReviewField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewField {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

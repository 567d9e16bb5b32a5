use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::workflows::ingestion::ScanId;

/// Identifier wrapper for a registered aircraft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AircraftId(pub String);

impl fmt::Display for AircraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aircraft identity as known to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aircraft {
    pub id: AircraftId,
    pub registration: String,
}

/// Declared kind of a scanned document, used as an extraction hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    MaintenanceReport,
    Invoice,
    Stc,
    Other,
}

impl DocumentType {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::MaintenanceReport => "maintenance_report",
            DocumentType::Invoice => "invoice",
            DocumentType::Stc => "stc",
            DocumentType::Other => "other",
        }
    }

    /// Accepts the wire label in snake, camel, or kebab case.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "maintenancereport" => Some(DocumentType::MaintenanceReport),
            "invoice" => Some(DocumentType::Invoice),
            "stc" => Some(DocumentType::Stc),
            "other" => Some(DocumentType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// User-editable "last performed" inputs for the tracked components.
///
/// Dates stay as the raw text that was entered or extracted; the compliance engine
/// parses them and reports `unknown` for anything it cannot read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitInputs {
    pub engine_tbo_hours: Option<f64>,
    pub engine_hours_since_overhaul: Option<f64>,
    pub avionics_certification_date: Option<String>,
    pub magneto_hours_since_inspection: Option<f64>,
    pub vacuum_pump_hours_since_replacement: Option<f64>,
    pub propeller_last_inspection: Option<String>,
    pub airframe_last_inspection: Option<String>,
}

/// Fixed intervals and limits for this deployment. Not user-editable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitPolicy {
    pub propeller_interval_months: u32,
    pub airframe_interval_months: u32,
    pub avionics_interval_months: u32,
    pub magneto_limit_hours: f64,
    pub vacuum_pump_limit_hours: f64,
}

impl LimitPolicy {
    pub const FIXED: LimitPolicy = LimitPolicy {
        propeller_interval_months: 60,
        airframe_interval_months: 60,
        avionics_interval_months: 24,
        magneto_limit_hours: 500.0,
        vacuum_pump_limit_hours: 400.0,
    };
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::FIXED
    }
}

/// Current maintenance-limit inputs for one aircraft together with the fixed policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceLimitsSnapshot {
    pub aircraft_id: AircraftId,
    pub inputs: LimitInputs,
    pub policy: LimitPolicy,
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceLimitsSnapshot {
    pub fn new(aircraft_id: AircraftId, inputs: LimitInputs, updated_at: DateTime<Utc>) -> Self {
        Self {
            aircraft_id,
            inputs,
            policy: LimitPolicy::FIXED,
            updated_at,
        }
    }

    /// Snapshot with no inputs; every tracked item evaluates to `unknown`.
    pub fn empty(aircraft_id: AircraftId, at: DateTime<Utc>) -> Self {
        Self::new(aircraft_id, LimitInputs::default(), at)
    }
}

/// Identifier for a committed maintenance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maintenance fact written by an applied scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    pub id: RecordId,
    pub aircraft_id: AircraftId,
    pub source_scan: ScanId,
    pub document_type: DocumentType,
    pub fields: BTreeMap<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

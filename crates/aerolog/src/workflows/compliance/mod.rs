//! Reference status for time- and hour-limited components.
//!
//! Every status here is an advisory signal that flags items for human review. Nothing
//! in this module makes a legal airworthiness determination, and nothing here performs
//! I/O: identical inputs always produce identical reports.

mod config;
mod rules;


pub use config::ComplianceConfig;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::workflows::maintenance::MaintenanceLimitsSnapshot;

/// Components tracked by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceItem {
    EngineTbo,
    Avionics,
    Magnetos,
    VacuumPump,
    Propeller,
    Airframe,
}

impl ComplianceItem {
    pub const ALL: [ComplianceItem; 6] = [
        ComplianceItem::EngineTbo,
        ComplianceItem::Avionics,
        ComplianceItem::Magnetos,
        ComplianceItem::VacuumPump,
        ComplianceItem::Propeller,
        ComplianceItem::Airframe,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ComplianceItem::EngineTbo => "Engine TBO",
            ComplianceItem::Avionics => "Avionics certification",
            ComplianceItem::Magnetos => "Magnetos",
            ComplianceItem::VacuumPump => "Vacuum pump",
            ComplianceItem::Propeller => "Propeller inspection",
            ComplianceItem::Airframe => "Airframe inspection",
        }
    }
}

/// Reference signal for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Ok,
    Warning,
    Expired,
    Unknown,
}

impl ReferenceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ReferenceStatus::Ok => "ok",
            ReferenceStatus::Warning => "warning",
            ReferenceStatus::Expired => "expired",
            ReferenceStatus::Unknown => "unknown",
        }
    }

    /// Whether the item should be surfaced for review.
    pub fn needs_attention(self) -> bool {
        !matches!(self, ReferenceStatus::Ok)
    }
}

/// Margin left before the limit; negative once it has been passed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "unit", content = "value")]
pub enum Remaining {
    Hours(f64),
    Days(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub status: ReferenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Remaining>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
}

impl ItemStatus {
    pub(crate) fn unknown() -> Self {
        Self {
            status: ReferenceStatus::Unknown,
            remaining: None,
            due_on: None,
        }
    }
}

/// Derived, never persisted, status per tracked item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub as_of: NaiveDate,
    pub items: BTreeMap<ComplianceItem, ItemStatus>,
}

impl ComplianceReport {
    pub fn status_of(&self, item: ComplianceItem) -> ReferenceStatus {
        self.items
            .get(&item)
            .map(|entry| entry.status)
            .unwrap_or(ReferenceStatus::Unknown)
    }

    /// Items in `warning`, `expired`, or `unknown`, in declaration order.
    pub fn attention_items(&self) -> Vec<(ComplianceItem, ReferenceStatus)> {
        self.items
            .iter()
            .filter(|(_, entry)| entry.status.needs_attention())
            .map(|(item, entry)| (*item, entry.status))
            .collect()
    }
}

/// Stateless evaluator applying the fixed policy and warning windows to a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ComplianceEngine {
    config: ComplianceConfig,
}

impl ComplianceEngine {
    pub fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        snapshot: &MaintenanceLimitsSnapshot,
        as_of: NaiveDate,
    ) -> ComplianceReport {
        let inputs = &snapshot.inputs;
        let policy = &snapshot.policy;
        let ratio = self.config.hour_warning_ratio();
        let fraction = self.config.date_warning_fraction();

        let mut items = BTreeMap::new();
        items.insert(
            ComplianceItem::EngineTbo,
            rules::hour_limited(
                inputs.engine_hours_since_overhaul,
                inputs.engine_tbo_hours,
                ratio,
            ),
        );
        items.insert(
            ComplianceItem::Magnetos,
            rules::hour_limited(
                inputs.magneto_hours_since_inspection,
                Some(policy.magneto_limit_hours),
                ratio,
            ),
        );
        items.insert(
            ComplianceItem::VacuumPump,
            rules::hour_limited(
                inputs.vacuum_pump_hours_since_replacement,
                Some(policy.vacuum_pump_limit_hours),
                ratio,
            ),
        );
        items.insert(
            ComplianceItem::Avionics,
            rules::date_limited(
                inputs.avionics_certification_date.as_deref(),
                policy.avionics_interval_months,
                as_of,
                fraction,
            ),
        );
        items.insert(
            ComplianceItem::Propeller,
            rules::date_limited(
                inputs.propeller_last_inspection.as_deref(),
                policy.propeller_interval_months,
                as_of,
                fraction,
            ),
        );
        items.insert(
            ComplianceItem::Airframe,
            rules::date_limited(
                inputs.airframe_last_inspection.as_deref(),
                policy.airframe_interval_months,
                as_of,
                fraction,
            ),
        );

        ComplianceReport { as_of, items }
    }
}

/// Evaluate with the default warning windows.
pub fn evaluate(snapshot: &MaintenanceLimitsSnapshot, as_of: NaiveDate) -> ComplianceReport {
    ComplianceEngine::default().evaluate(snapshot, as_of)
}

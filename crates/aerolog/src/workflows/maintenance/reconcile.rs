//! Mapping from validated scan fields onto the editable limit inputs.

use chrono::NaiveDate;
use serde_json::Value;

use super::domain::LimitInputs;
use crate::workflows::ingestion::ValidatedFields;

/// Limit input a validated field can overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitField {
    EngineTboHours,
    EngineHoursSinceOverhaul,
    AvionicsCertificationDate,
    MagnetoHours,
    VacuumPumpHours,
    PropellerInspectionDate,
    AirframeInspectionDate,
}

impl LimitField {
    fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "enginetbohours" | "enginetbo" => Some(Self::EngineTboHours),
            "enginehourssinceoverhaul" | "enginehours" | "smoh" => {
                Some(Self::EngineHoursSinceOverhaul)
            }
            "avionicscertificationdate" | "avionicsdate" => Some(Self::AvionicsCertificationDate),
            "magnetohours" | "magnetohourssinceinspection" => Some(Self::MagnetoHours),
            "vacuumpumphours" | "vacuumpumphourssincereplacement" => Some(Self::VacuumPumpHours),
            "propellerinspectiondate" | "propellerlastinspection" => {
                Some(Self::PropellerInspectionDate)
            }
            "airframeinspectiondate" | "airframelastinspection" | "annualinspectiondate" => {
                Some(Self::AirframeInspectionDate)
            }
            _ => None,
        }
    }

    fn is_date(self) -> bool {
        matches!(
            self,
            Self::AvionicsCertificationDate
                | Self::PropellerInspectionDate
                | Self::AirframeInspectionDate
        )
    }
}

/// Rejection raised when a validated field targets a limit input with an unusable value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("field '{field}' {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
enum LimitValue {
    Hours(f64),
    Date(NaiveDate),
}

/// Parsed set of limit changes carried by a validated payload.
///
/// Parsing is all-or-nothing so a store can apply the update without partial writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitUpdate {
    changes: Vec<(LimitField, LimitValue)>,
}

impl LimitUpdate {
    pub fn from_fields(fields: &ValidatedFields) -> Result<Self, FieldError> {
        let mut changes = Vec::new();

        for (name, value) in fields.iter() {
            let Some(field) = LimitField::from_name(name) else {
                continue;
            };

            let parsed = if field.is_date() {
                LimitValue::Date(parse_date_value(name, value)?)
            } else {
                LimitValue::Hours(parse_hours_value(name, value)?)
            };
            changes.push((field, parsed));
        }

        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Overwrite the matching inputs, leaving the rest untouched.
    pub fn apply_to(&self, inputs: &mut LimitInputs) {
        for (field, value) in &self.changes {
            match (field, value) {
                (LimitField::EngineTboHours, LimitValue::Hours(hours)) => {
                    inputs.engine_tbo_hours = Some(*hours)
                }
                (LimitField::EngineHoursSinceOverhaul, LimitValue::Hours(hours)) => {
                    inputs.engine_hours_since_overhaul = Some(*hours)
                }
                (LimitField::MagnetoHours, LimitValue::Hours(hours)) => {
                    inputs.magneto_hours_since_inspection = Some(*hours)
                }
                (LimitField::VacuumPumpHours, LimitValue::Hours(hours)) => {
                    inputs.vacuum_pump_hours_since_replacement = Some(*hours)
                }
                (LimitField::AvionicsCertificationDate, LimitValue::Date(date)) => {
                    inputs.avionics_certification_date = Some(date.to_string())
                }
                (LimitField::PropellerInspectionDate, LimitValue::Date(date)) => {
                    inputs.propeller_last_inspection = Some(date.to_string())
                }
                (LimitField::AirframeInspectionDate, LimitValue::Date(date)) => {
                    inputs.airframe_last_inspection = Some(date.to_string())
                }
                _ => {}
            }
        }
    }
}

fn parse_hours_value(name: &str, value: &Value) -> Result<f64, FieldError> {
    let hours = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };

    match hours {
        Some(hours) if hours.is_finite() && hours >= 0.0 => Ok(hours),
        Some(_) => Err(FieldError {
            field: name.to_string(),
            reason: "must be a non-negative number of hours".to_string(),
        }),
        None => Err(FieldError {
            field: name.to_string(),
            reason: format!("expected hours, found {value}"),
        }),
    }
}

fn parse_date_value(name: &str, value: &Value) -> Result<NaiveDate, FieldError> {
    let Value::String(text) = value else {
        return Err(FieldError {
            field: name.to_string(),
            reason: format!("expected a YYYY-MM-DD date, found {value}"),
        });
    };

    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|err| FieldError {
        field: name.to_string(),
        reason: format!("is not a YYYY-MM-DD date ({err})"),
    })
}

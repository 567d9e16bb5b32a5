use std::path::PathBuf;
use std::sync::Arc;

use aerolog::clock::{Clock, ManualClock};
use aerolog::config::{AppConfig, IngestionConfig};
use aerolog::error::AppError;
use aerolog::workflows::compliance::{
    ComplianceConfig, ComplianceEngine, ComplianceReport, Remaining,
};
use aerolog::workflows::ingestion::{
    AccountId, QuotaLedger, ScanError, ScanLifecycleManager, ScanSubmission, ValidatedFields,
};
use aerolog::workflows::maintenance::{
    Aircraft, AircraftId, AircraftStatusService, LimitInputs, MaintenanceLimitsSnapshot,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Args;
use serde_json::json;

use crate::infra::{CannedVisionExtractor, InMemoryBulletinFeed, InMemoryMaintenanceStore};

#[derive(Args, Debug, Default)]
pub(crate) struct ComplianceEvaluateArgs {
    /// Tail number reported in the output
    #[arg(long, default_value = "N4512K")]
    pub(crate) aircraft: String,
    /// JSON file with limit inputs (camelCase keys, as accepted by the limits endpoint)
    #[arg(long)]
    pub(crate) limits: Option<PathBuf>,
    /// Evaluation date (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Engine time between overhauls, in hours
    #[arg(long)]
    pub(crate) engine_tbo_hours: Option<f64>,
    /// Engine hours since major overhaul
    #[arg(long)]
    pub(crate) engine_hours: Option<f64>,
    /// Last avionics certification (YYYY-MM-DD)
    #[arg(long)]
    pub(crate) avionics_date: Option<String>,
    /// Hours since the last magneto inspection
    #[arg(long)]
    pub(crate) magneto_hours: Option<f64>,
    /// Hours since the vacuum pump was replaced
    #[arg(long)]
    pub(crate) vacuum_pump_hours: Option<f64>,
    /// Last propeller inspection (YYYY-MM-DD)
    #[arg(long)]
    pub(crate) propeller_date: Option<String>,
    /// Last airframe inspection (YYYY-MM-DD)
    #[arg(long)]
    pub(crate) airframe_date: Option<String>,
    /// Override the configured hour warning ratio
    #[arg(long)]
    pub(crate) hour_warning_ratio: Option<f64>,
    /// Override the configured date warning fraction
    #[arg(long)]
    pub(crate) date_warning_fraction: Option<f64>,
    /// Print the report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Date the demo runs on (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Scan credits granted to the demo account
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(2..))]
    pub(crate) quota_ceiling: u32,
}

pub(crate) fn run_compliance_evaluate(args: ComplianceEvaluateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let ComplianceEvaluateArgs {
        aircraft,
        limits,
        as_of,
        engine_tbo_hours,
        engine_hours,
        avionics_date,
        magneto_hours,
        vacuum_pump_hours,
        propeller_date,
        airframe_date,
        hour_warning_ratio,
        date_warning_fraction,
        json,
    } = args;

    let mut inputs = match limits {
        Some(path) => load_limits(path)?,
        None => LimitInputs::default(),
    };
    inputs.engine_tbo_hours = engine_tbo_hours.or(inputs.engine_tbo_hours);
    inputs.engine_hours_since_overhaul = engine_hours.or(inputs.engine_hours_since_overhaul);
    inputs.avionics_certification_date =
        avionics_date.or(inputs.avionics_certification_date);
    inputs.magneto_hours_since_inspection =
        magneto_hours.or(inputs.magneto_hours_since_inspection);
    inputs.vacuum_pump_hours_since_replacement =
        vacuum_pump_hours.or(inputs.vacuum_pump_hours_since_replacement);
    inputs.propeller_last_inspection = propeller_date.or(inputs.propeller_last_inspection);
    inputs.airframe_last_inspection = airframe_date.or(inputs.airframe_last_inspection);

    let compliance = ComplianceConfig::new(
        hour_warning_ratio.unwrap_or(config.compliance.hour_warning_ratio()),
        date_warning_fraction.unwrap_or(config.compliance.date_warning_fraction()),
    );

    let now = Utc::now();
    let as_of = as_of.unwrap_or_else(|| now.date_naive());
    let snapshot = MaintenanceLimitsSnapshot::new(AircraftId(aircraft), inputs, now);
    let report = ComplianceEngine::new(compliance).evaluate(&snapshot, as_of);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(payload) => println!("{payload}"),
            Err(err) => return Err(AppError::Input(format!("report not serializable: {err}"))),
        }
    } else {
        println!("Aircraft {}", snapshot.aircraft_id);
        render_report(&report);
    }
    Ok(())
}

fn load_limits(path: PathBuf) -> Result<LimitInputs, AppError> {
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|err| {
        AppError::Input(format!("{} is not a limits document: {err}", path.display()))
    })
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    let start = as_of.and_time(noon).and_utc();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start));

    let tail = AircraftId("N4512K".to_string());
    let account = AccountId("acct-demo".to_string());
    let ingestion = IngestionConfig {
        quota_ceiling: args.quota_ceiling,
        ..IngestionConfig::default()
    };

    let store = Arc::new(InMemoryMaintenanceStore::new(clock.clone()));
    store.register_aircraft(Aircraft {
        id: tail.clone(),
        registration: "N4512K".to_string(),
    });
    let bulletins = Arc::new(InMemoryBulletinFeed::default());
    bulletins.flag(tail.clone());

    let quota = Arc::new(QuotaLedger::new(ingestion.quota_ceiling, clock.clone()));
    let manager = ScanLifecycleManager::new(
        store.clone(),
        Arc::new(CannedVisionExtractor),
        quota,
        clock.clone(),
        ingestion.clone(),
    );
    let status = AircraftStatusService::new(
        store.clone(),
        bulletins,
        ComplianceEngine::default(),
        clock,
        ingestion.store_timeout,
    );

    println!("Aerolog demo for {tail} on {as_of}");
    status.update_limits(&tail, demo_inputs(as_of)).await?;
    let before = status.compliance_overview(&tail, None).await?;
    println!("\nBefore scanning");
    render_report(&before.report);
    if before.new_reference_item == Some(true) {
        println!("  New AD/SB reference item available for review");
    }

    println!("\nScanning a logbook entry");
    let scan = manager
        .submit(ScanSubmission {
            account_id: account.clone(),
            aircraft_id: tail.clone(),
            document_type: "maintenance_report".to_string(),
            image: b"logbook page 42".to_vec(),
        })
        .await?;
    println!("- scan {} -> {}", scan.id, scan.state);

    let sheet = manager.begin_validation(&scan.id).await?;
    println!("  Review sheet ({} fields):", sheet.fields.len());
    for field in &sheet.fields {
        let confidence = field
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        println!("    - {}: {} (confidence {confidence})", field.name, field.value);
    }

    let mut validated = ValidatedFields(
        sheet
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone()))
            .collect(),
    );
    validated.0.insert("engine_hours".to_string(), json!(1212.4));
    println!("  Reviewer corrected engine_hours to 1212.4");

    let applied = manager.apply(&scan.id, validated).await?;
    if let Some(record_id) = &applied.applied_record {
        println!("- scan {} -> {} as record {record_id}", applied.id, applied.state);
    }

    let after = status.compliance_overview(&tail, None).await?;
    println!("\nAfter applying the scan");
    render_report(&after.report);

    println!("\nDiscarding a blurry invoice");
    let invoice = manager
        .submit(ScanSubmission {
            account_id: account.clone(),
            aircraft_id: tail.clone(),
            document_type: "invoice".to_string(),
            image: b"blurry invoice".to_vec(),
        })
        .await?;
    let rejected = manager.reject(&invoice.id).await?;
    println!("- scan {} -> {} (credit stays spent)", rejected.id, rejected.state);

    println!("\nSpending the remaining credits");
    loop {
        let attempt = manager
            .submit(ScanSubmission {
                account_id: account.clone(),
                aircraft_id: tail.clone(),
                document_type: "other".to_string(),
                image: b"loose page".to_vec(),
            })
            .await;
        match attempt {
            Ok(scan) => println!("- scan {} -> {}", scan.id, scan.state),
            Err(ScanError::QuotaExceeded {
                ceiling,
                period_end,
                ..
            }) => {
                println!("- refused: {ceiling} scans per period, resets {period_end}");
                break;
            }
            Err(other) => return Err(other.into()),
        }
    }

    let usage = manager.quota_status(&account);
    println!(
        "\nQuota: {} consumed / {} ceiling ({} in flight)",
        usage.consumed, usage.ceiling, usage.reserved
    );

    println!("Scan history (newest first):");
    for summary in manager.history(&tail).await {
        println!(
            "  - {} {} {} ({} fields)",
            summary.scan_id, summary.document_type, summary.state, summary.field_count
        );
    }
    println!(
        "Record store holds {} record(s) and {} history entries",
        store.records(&tail).len(),
        store.history().len()
    );

    Ok(())
}

fn demo_inputs(as_of: NaiveDate) -> LimitInputs {
    let years_ago = |years: u32| {
        as_of
            .checked_sub_months(chrono::Months::new(years * 12))
            .unwrap_or(as_of)
            .to_string()
    };

    LimitInputs {
        engine_tbo_hours: Some(2000.0),
        engine_hours_since_overhaul: Some(1180.0),
        avionics_certification_date: Some(years_ago(2)),
        magneto_hours_since_inspection: Some(480.0),
        vacuum_pump_hours_since_replacement: Some(150.0),
        propeller_last_inspection: Some(years_ago(3)),
        airframe_last_inspection: None,
    }
}

pub(crate) fn render_report(report: &ComplianceReport) {
    println!(
        "Reference status as of {} (advisory only, not an airworthiness determination)",
        report.as_of
    );
    for (item, entry) in &report.items {
        let margin = match entry.remaining {
            Some(Remaining::Hours(hours)) if hours < 0.0 => format!("{:.1} h over", -hours),
            Some(Remaining::Hours(hours)) => format!("{hours:.1} h left"),
            Some(Remaining::Days(days)) if days < 0 => format!("{} days overdue", -days),
            Some(Remaining::Days(days)) => format!("{days} days left"),
            None => "-".to_string(),
        };
        let due = entry
            .due_on
            .map(|due| format!(", due {due}"))
            .unwrap_or_default();
        println!(
            "  - {:<24} {:<8} {margin}{due}",
            item.label(),
            entry.status.label()
        );
    }

    let attention = report.attention_items();
    if !attention.is_empty() {
        println!("  {} item(s) flagged for review", attention.len());
    }
}

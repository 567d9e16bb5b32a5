use chrono::{Duration, Months, NaiveDate};

use super::{ItemStatus, Remaining, ReferenceStatus};

/// Hours-based rule: `expired` at or past the limit, `warning` at or past
/// `warning_ratio * limit`.
pub(crate) fn hour_limited(
    hours_since: Option<f64>,
    limit: Option<f64>,
    warning_ratio: f64,
) -> ItemStatus {
    let (Some(hours_since), Some(limit)) = (usable_hours(hours_since), limit) else {
        return ItemStatus::unknown();
    };
    if !limit.is_finite() || limit <= 0.0 {
        return ItemStatus::unknown();
    }

    let status = if hours_since >= limit {
        ReferenceStatus::Expired
    } else if hours_since >= warning_ratio * limit {
        ReferenceStatus::Warning
    } else {
        ReferenceStatus::Ok
    };

    ItemStatus {
        status,
        remaining: Some(Remaining::Hours(limit - hours_since)),
        due_on: None,
    }
}

/// Calendar rule: due `interval_months` after the last date, `warning` inside the
/// trailing `warning_fraction` of the interval, `expired` once past due.
pub(crate) fn date_limited(
    last_performed: Option<&str>,
    interval_months: u32,
    as_of: NaiveDate,
    warning_fraction: f64,
) -> ItemStatus {
    let Some(last) = last_performed.and_then(parse_date) else {
        return ItemStatus::unknown();
    };
    if last > as_of {
        return ItemStatus::unknown();
    }
    let Some(due) = last.checked_add_months(Months::new(interval_months)) else {
        return ItemStatus::unknown();
    };

    let interval_days = (due - last).num_days();
    let window_days = (interval_days as f64 * warning_fraction).ceil() as i64;
    let warning_from = due - Duration::days(window_days);

    let status = if as_of > due {
        ReferenceStatus::Expired
    } else if as_of >= warning_from {
        ReferenceStatus::Warning
    } else {
        ReferenceStatus::Ok
    };

    ItemStatus {
        status,
        remaining: Some(Remaining::Days((due - as_of).num_days())),
        due_on: Some(due),
    }
}

fn usable_hours(hours: Option<f64>) -> Option<f64> {
    hours.filter(|value| value.is_finite() && *value >= 0.0)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

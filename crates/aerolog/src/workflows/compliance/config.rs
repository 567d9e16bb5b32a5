const DEFAULT_HOUR_WARNING_RATIO: f64 = 0.9;
const DEFAULT_DATE_WARNING_FRACTION: f64 = 0.1;

/// Warning-window dials for the reference status rules. Only built through
/// [`ComplianceConfig::new`], so the dials are always in range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplianceConfig {
    hour_warning_ratio: f64,
    date_warning_fraction: f64,
}

impl ComplianceConfig {
    /// `hour_warning_ratio` is the share of an hour limit at which an item turns to
    /// `warning`; `date_warning_fraction` is the trailing share of a date interval
    /// treated as the grace window. Out-of-range values fall back to the defaults.
    pub fn new(hour_warning_ratio: f64, date_warning_fraction: f64) -> Self {
        let hour_warning_ratio = if hour_warning_ratio.is_finite()
            && hour_warning_ratio > 0.0
            && hour_warning_ratio <= 1.0
        {
            hour_warning_ratio
        } else {
            DEFAULT_HOUR_WARNING_RATIO
        };

        let date_warning_fraction = if date_warning_fraction.is_finite()
            && (0.0..1.0).contains(&date_warning_fraction)
        {
            date_warning_fraction
        } else {
            DEFAULT_DATE_WARNING_FRACTION
        };

        Self {
            hour_warning_ratio,
            date_warning_fraction,
        }
    }

    pub fn hour_warning_ratio(&self) -> f64 {
        self.hour_warning_ratio
    }

    pub fn date_warning_fraction(&self) -> f64 {
        self.date_warning_fraction
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOUR_WARNING_RATIO, DEFAULT_DATE_WARNING_FRACTION)
    }
}

use std::fmt;

use serde::Serialize;

use super::rules::{
    Band, HIGH_WEEKLY_BANDS, LOW_MONTHLY_BANDS, MEDIUM_WEEKLY_BANDS, PERIODS_PER_MONTH,
};
use super::types::{IntensityTier, SchedulePeriod};

/// Weekly deposit due at `elapsed_years` into a commitment.
///
/// Built-in tiers read the shared band table. The custom tier returns the
/// amount of the first period whose `[start_year - 1, end_year)` window holds
/// `elapsed_years`, falling back to `custom_default` (or zero). A missing tier
/// is not an error: nothing is due.
pub fn resolve_periodic_amount(
    tier: Option<IntensityTier>,
    elapsed_years: f64,
    custom_schedule: &[SchedulePeriod],
    custom_default: Option<f64>,
) -> f64 {
    let elapsed = if elapsed_years.is_nan() {
        0.0
    } else {
        elapsed_years.max(0.0)
    };

    let amount = match tier {
        Some(IntensityTier::Low) => band_amount(&LOW_MONTHLY_BANDS, elapsed) / PERIODS_PER_MONTH,
        Some(IntensityTier::Medium) => band_amount(&MEDIUM_WEEKLY_BANDS, elapsed),
        Some(IntensityTier::High) => band_amount(&HIGH_WEEKLY_BANDS, elapsed),
        Some(IntensityTier::Custom) => custom_schedule
            .iter()
            .find(|period| period_contains(period, elapsed))
            .map(|period| period.amount)
            .or(custom_default)
            .unwrap_or(0.0),
        None => 0.0,
    };
    amount.max(0.0)
}

fn band_amount(bands: &[Band], elapsed: f64) -> f64 {
    bands
        .iter()
        .find(|band| band.until_years.is_none_or(|until| elapsed < until))
        .map(|band| band.amount)
        .unwrap_or(0.0)
}

fn period_contains(period: &SchedulePeriod, elapsed: f64) -> bool {
    let start = period.start_year.saturating_sub(1) as f64;
    elapsed >= start && elapsed < period.end_year as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScheduleWarning {
    /// Two periods cover the same year; the earlier entry shadows the later one.
    #[serde(rename_all = "camelCase")]
    Overlap { first: usize, second: usize },
    /// No period covers the years between two consecutive periods.
    #[serde(rename_all = "camelCase")]
    Gap { from_year: u32, to_year: u32 },
}

impl fmt::Display for ScheduleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleWarning::Overlap { first, second } => write!(
                f,
                "schedule period #{second} overlaps period #{first}; the earlier period wins"
            ),
            ScheduleWarning::Gap { from_year, to_year } => write!(
                f,
                "no schedule period covers years {from_year} to {to_year}; the default amount applies"
            ),
        }
    }
}

/// Reports overlapping and gapped periods. Resolution is unaffected.
pub fn schedule_warnings(schedule: &[SchedulePeriod]) -> Vec<ScheduleWarning> {
    let mut warnings = Vec::new();

    for (i, a) in schedule.iter().enumerate() {
        for (j, b) in schedule.iter().enumerate().skip(i + 1) {
            let a_start = a.start_year.saturating_sub(1);
            let b_start = b.start_year.saturating_sub(1);
            if a_start < b.end_year && b_start < a.end_year {
                warnings.push(ScheduleWarning::Overlap {
                    first: i,
                    second: j,
                });
            }
        }
    }

    let mut ordered: Vec<&SchedulePeriod> = schedule.iter().collect();
    ordered.sort_by_key(|period| (period.start_year, period.end_year));
    let mut covered_until = match ordered.first() {
        Some(first) => first.end_year,
        None => return warnings,
    };
    for period in ordered.iter().skip(1) {
        let start = period.start_year.saturating_sub(1);
        if start > covered_until {
            warnings.push(ScheduleWarning::Gap {
                from_year: covered_until + 1,
                to_year: start,
            });
        }
        covered_until = covered_until.max(period.end_year);
    }

    warnings
}

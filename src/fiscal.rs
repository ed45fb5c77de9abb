//! Calendar helpers for city fiscal years and forecast periods
//!
//! The city fiscal year runs July through June and is named for the calendar
//! year in which it ends. All periods are identified by their first day:
//! monthly periods by the first of the month, quarterly periods by the first
//! day of the calendar quarter.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Sampling frequency of a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(alias = "M", alias = "monthly")]
    Monthly,
    #[serde(alias = "Q", alias = "quarterly")]
    Quarterly,
}

impl Frequency {
    /// Number of months spanned by one period
    pub fn months(&self) -> u32 {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
        }
    }

    /// Number of periods in a year
    pub fn periods_per_year(&self) -> usize {
        (12 / self.months()) as usize
    }

    /// Short code used in cache keys and file names
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Monthly => "M",
            Frequency::Quarterly => "Q",
        }
    }

    /// Suffix used for spreadsheet sheet names
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Monthly => "Monthly",
            Frequency::Quarterly => "Quarterly",
        }
    }

    /// Snap a date to the start of the period containing it
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Monthly => month_start(date),
            Frequency::Quarterly => quarter_start(date),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Fiscal year of a date (July 2020 belongs to FY2021)
pub fn fiscal_year(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the calendar quarter containing `date`
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Calendar quarter label such as `2021Q1`
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{}Q{}", date.year(), date.month0() / 3 + 1)
}

/// Whole periods from the period containing `from` to the one containing `to`
///
/// Negative when `to` falls in an earlier period.
pub fn period_offset(from: NaiveDate, to: NaiveDate, freq: Frequency) -> i32 {
    let from = freq.period_start(from);
    let to = freq.period_start(to);
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    months / freq.months() as i32
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ForecastError::Parse(format!("invalid date '{}': {}", s, e)))
}

/// Advance a period start by `n` periods
pub fn add_periods(date: NaiveDate, n: u32, freq: Frequency) -> NaiveDate {
    date.checked_add_months(Months::new(n * freq.months()))
        .unwrap_or(NaiveDate::MAX)
}

/// Inclusive range of period starts between `start` and `stop`
///
/// `start` is snapped forward to a period boundary when it falls mid-period,
/// matching how a date range at the frequency would be generated.
pub fn period_range(start: NaiveDate, stop: NaiveDate, freq: Frequency) -> Vec<NaiveDate> {
    let mut current = freq.period_start(start);
    if current < start {
        current = add_periods(current, 1, freq);
    }

    let mut out = Vec::new();
    while current <= stop {
        out.push(current);
        current = add_periods(current, 1, freq);
    }
    out
}

/// Sum monthly values into calendar quarters
///
/// Quarters with fewer than three observed months are dropped.
pub fn aggregate_to_quarters(monthly: &BTreeMap<NaiveDate, f64>) -> BTreeMap<NaiveDate, f64> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (&date, &value) in monthly {
        let entry = sums.entry(quarter_start(date)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    sums.into_iter()
        .filter(|(_, (_, count))| *count == 3)
        .map(|(date, (sum, _))| (date, sum))
        .collect()
}

/// Decimal year used as the time axis for fitting and plotting
pub fn decimal_year(date: NaiveDate) -> f64 {
    let days_in_year = if NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    date.year() as f64 + date.ordinal0() as f64 / days_in_year
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_fiscal_year() {
        assert_eq!(fiscal_year(d(2020, 6, 30)), 2020);
        assert_eq!(fiscal_year(d(2020, 7, 1)), 2021);
        assert_eq!(fiscal_year(d(2021, 1, 1)), 2021);
    }

    #[test]
    fn test_quarter_start() {
        assert_eq!(quarter_start(d(2021, 5, 17)), d(2021, 4, 1));
        assert_eq!(quarter_start(d(2021, 12, 31)), d(2021, 10, 1));
    }

    #[test]
    fn test_quarter_label() {
        assert_eq!(quarter_label(d(2021, 1, 1)), "2021Q1");
        assert_eq!(quarter_label(d(2020, 8, 15)), "2020Q3");
        assert_eq!(quarter_label(d(2022, 12, 31)), "2022Q4");
    }

    #[test]
    fn test_period_offset() {
        assert_eq!(period_offset(d(2021, 1, 1), d(2022, 4, 1), Frequency::Quarterly), 5);
        assert_eq!(period_offset(d(2021, 1, 1), d(2021, 3, 31), Frequency::Quarterly), 0);
        assert_eq!(period_offset(d(2021, 1, 1), d(2022, 6, 1), Frequency::Monthly), 17);
        assert_eq!(period_offset(d(2021, 1, 1), d(2020, 10, 1), Frequency::Quarterly), -1);
    }

    #[test]
    fn test_period_range_quarterly() {
        let range = period_range(d(2021, 1, 1), d(2022, 6, 30), Frequency::Quarterly);
        assert_eq!(range.len(), 6);
        assert_eq!(range[0], d(2021, 1, 1));
        assert_eq!(range[5], d(2022, 4, 1));
    }

    #[test]
    fn test_period_range_snaps_forward() {
        let range = period_range(d(2021, 2, 15), d(2021, 7, 1), Frequency::Quarterly);
        assert_eq!(range, vec![d(2021, 4, 1), d(2021, 7, 1)]);
    }

    #[test]
    fn test_aggregate_to_quarters_drops_partial() {
        let mut monthly = BTreeMap::new();
        for m in 1..=5 {
            monthly.insert(d(2021, m, 1), 10.0);
        }
        let quarters = aggregate_to_quarters(&monthly);
        assert_eq!(quarters.len(), 1);
        assert_eq!(quarters[&d(2021, 1, 1)], 30.0);
    }
}

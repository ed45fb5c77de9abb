//! Scenario adjustments applied to baseline revenue

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::error::{ForecastError, Result};
use crate::fiscal::fiscal_year;

/// Group used for sectors not listed in any other group
pub const DEFAULT_GROUP: &str = "default";

/// Position of one date inside the forecast window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub date: NaiveDate,
    /// Index of the latest forecast date not after `date`
    pub index: usize,
    /// Number of forecast dates in the window
    pub count: usize,
}

/// How a scenario changes the baseline of one tax
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    /// Fractional decline from the baseline for each forecast period
    Declines(Vec<f64>),

    /// Per-period declines for groups of sectors
    ///
    /// Sectors outside every group use the [`DEFAULT_GROUP`] declines.
    SectorDeclines {
        groups: BTreeMap<String, Vec<String>>,
        declines: BTreeMap<String, Vec<f64>>,
    },

    /// Absolute revenue per sector for each forecast period
    SectorValues(BTreeMap<String, Vec<f64>>),

    /// Decline by fiscal year of the period
    FiscalYearDeclines(BTreeMap<i32, f64>),

    /// Decline by calendar year of the period
    CalendarYearDeclines(BTreeMap<i32, f64>),

    /// Initial sector declines that decay geometrically
    ///
    /// The decline holds at its initial value for `hold_periods`, then
    /// equals `initial * (1 - rate)^(index * speed)` where `rate` is the
    /// impacted or the default recovery rate.
    RecoveryCurve {
        initial: BTreeMap<String, f64>,
        impacted: Vec<String>,
        impacted_recovery: f64,
        default_recovery: f64,
        hold_periods: usize,
        speed: f64,
    },
}

impl Adjustment {
    /// Whether the adjustment replaces baseline values instead of scaling them
    pub fn ignores_baseline(&self) -> bool {
        matches!(self, Adjustment::SectorValues(_))
    }

    /// Restate the assumption for periods `parts` times shorter
    ///
    /// Declines repeat for every sub-period, absolute values are split
    /// evenly across them, and a recovery curve keeps its value at the
    /// start of every original period.
    pub fn subdivide(&self, parts: usize) -> Adjustment {
        if parts <= 1 {
            return self.clone();
        }
        let repeat = |values: &[f64], scale: f64| -> Vec<f64> {
            values
                .iter()
                .flat_map(|&v| std::iter::repeat(v * scale).take(parts))
                .collect()
        };

        match self {
            Adjustment::Declines(declines) => Adjustment::Declines(repeat(declines, 1.0)),
            Adjustment::SectorDeclines { groups, declines } => Adjustment::SectorDeclines {
                groups: groups.clone(),
                declines: declines
                    .iter()
                    .map(|(group, d)| (group.clone(), repeat(d, 1.0)))
                    .collect(),
            },
            Adjustment::SectorValues(values) => Adjustment::SectorValues(
                values
                    .iter()
                    .map(|(sector, v)| (sector.clone(), repeat(v, 1.0 / parts as f64)))
                    .collect(),
            ),
            Adjustment::FiscalYearDeclines(_) | Adjustment::CalendarYearDeclines(_) => self.clone(),
            Adjustment::RecoveryCurve {
                initial,
                impacted,
                impacted_recovery,
                default_recovery,
                hold_periods,
                speed,
            } => Adjustment::RecoveryCurve {
                initial: initial.clone(),
                impacted: impacted.clone(),
                impacted_recovery: *impacted_recovery,
                default_recovery: *default_recovery,
                hold_periods: hold_periods * parts,
                speed: speed / parts as f64,
            },
        }
    }

    /// Adjusted values of every sector for one period
    pub fn apply(&self, period: Period, baseline: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        for (sector, &value) in baseline {
            out.insert(sector.clone(), self.apply_sector(period, sector, value)?);
        }
        Ok(out)
    }

    fn apply_sector(&self, period: Period, sector: &str, baseline: f64) -> Result<f64> {
        match self {
            Adjustment::Declines(declines) => {
                let d = per_period(declines, period)?;
                Ok(baseline * (1.0 - d))
            }
            Adjustment::SectorDeclines { groups, declines } => {
                let group = groups
                    .iter()
                    .find(|(_, members)| members.iter().any(|m| m == sector))
                    .map(|(label, _)| label.as_str())
                    .unwrap_or(DEFAULT_GROUP);
                let series = declines.get(group).ok_or_else(|| {
                    ForecastError::MissingData(format!("no declines for sector group '{}'", group))
                })?;
                Ok(baseline * (1.0 - per_period(series, period)?))
            }
            Adjustment::SectorValues(values) => {
                let series = values.get(sector).ok_or_else(|| {
                    ForecastError::MissingData(format!("no projected values for sector '{}'", sector))
                })?;
                per_period(series, period)
            }
            Adjustment::FiscalYearDeclines(by_year) => {
                let fy = fiscal_year(period.date);
                let d = by_year.get(&fy).ok_or_else(|| {
                    ForecastError::MissingData(format!("no decline for FY{}", fy))
                })?;
                Ok(baseline * (1.0 - d))
            }
            Adjustment::CalendarYearDeclines(by_year) => {
                let year = period.date.year();
                let d = by_year.get(&year).ok_or_else(|| {
                    ForecastError::MissingData(format!("no decline for calendar year {}", year))
                })?;
                Ok(baseline * (1.0 - d))
            }
            Adjustment::RecoveryCurve {
                initial,
                impacted,
                impacted_recovery,
                default_recovery,
                hold_periods,
                speed,
            } => {
                let drop = initial.get(sector).ok_or_else(|| {
                    ForecastError::MissingData(format!("no initial decline for sector '{}'", sector))
                })?;
                let rate = if impacted.iter().any(|s| s == sector) {
                    *impacted_recovery
                } else {
                    *default_recovery
                };
                let decline = if period.index < *hold_periods {
                    *drop
                } else {
                    drop * (1.0 - rate).powf(period.index as f64 * speed)
                };
                Ok(baseline * (1.0 - decline))
            }
        }
    }
}

/// Value of a per-period vector, checking its length against the window
fn per_period(values: &[f64], period: Period) -> Result<f64> {
    if values.len() != period.count {
        return Err(ForecastError::LengthMismatch {
            dates: period.count,
            declines: values.len(),
        });
    }
    values
        .get(period.index)
        .copied()
        .ok_or(ForecastError::LengthMismatch {
            dates: period.count,
            declines: values.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(index: usize) -> Period {
        Period {
            date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            index,
            count: 3,
        }
    }

    fn row(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    #[test]
    fn test_declines_scale_baseline() {
        let adj = Adjustment::Declines(vec![0.5, 0.25, 0.0]);
        let out = adj.apply(period(1), &row(&[("total", 100.0)])).unwrap();
        assert_eq!(out["total"], 75.0);

        let zero = Adjustment::Declines(vec![0.0; 3]);
        assert_eq!(zero.apply(period(2), &row(&[("total", 42.0)])).unwrap()["total"], 42.0);
    }

    #[test]
    fn test_length_mismatch() {
        let adj = Adjustment::Declines(vec![0.5, 0.25]);
        let err = adj.apply(period(0), &row(&[("total", 100.0)])).unwrap_err();
        assert!(matches!(err, ForecastError::LengthMismatch { dates: 3, declines: 2 }));
    }

    #[test]
    fn test_sector_groups_with_default() {
        let mut groups = BTreeMap::new();
        groups.insert("impacted".to_string(), vec!["Hotels".to_string()]);
        let mut declines = BTreeMap::new();
        declines.insert("impacted".to_string(), vec![0.5, 0.5, 0.5]);
        declines.insert(DEFAULT_GROUP.to_string(), vec![0.1, 0.1, 0.1]);

        let adj = Adjustment::SectorDeclines { groups, declines };
        let out = adj
            .apply(period(0), &row(&[("Hotels", 100.0), ("Retail", 100.0)]))
            .unwrap();
        assert_eq!(out["Hotels"], 50.0);
        assert!((out["Retail"] - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_sector_values_replace_baseline() {
        let mut values = BTreeMap::new();
        values.insert("Residential".to_string(), vec![1.0, 2.0, 3.0]);
        let adj = Adjustment::SectorValues(values);
        assert!(adj.ignores_baseline());

        let out = adj.apply(period(2), &row(&[("Residential", 100.0)])).unwrap();
        assert_eq!(out["Residential"], 3.0);
        assert!(adj.apply(period(0), &row(&[("Commercial", 1.0)])).is_err());
    }

    #[test]
    fn test_year_declines() {
        let mut by_year = BTreeMap::new();
        by_year.insert(2021, 0.1);
        let fy = Adjustment::FiscalYearDeclines(by_year.clone());
        let cy = Adjustment::CalendarYearDeclines(by_year);

        // January 2021 is in FY2021 and calendar 2021
        let out = fy.apply(period(0), &row(&[("total", 10.0)])).unwrap();
        assert!((out["total"] - 9.0).abs() < 1e-12);
        assert!((cy.apply(period(0), &row(&[("total", 10.0)])).unwrap()["total"] - 9.0).abs() < 1e-12);

        let july = Period {
            date: NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
            index: 2,
            count: 3,
        };
        assert!(fy.apply(july, &row(&[("total", 10.0)])).is_err());
        assert!(cy.apply(july, &row(&[("total", 10.0)])).is_ok());
    }

    #[test]
    fn test_subdivide_quarters_into_months() {
        let monthly = |index| Period {
            date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            index,
            count: 6,
        };

        let declines = Adjustment::Declines(vec![0.5, 0.25]).subdivide(3);
        assert_eq!(declines, Adjustment::Declines(vec![0.5, 0.5, 0.5, 0.25, 0.25, 0.25]));

        let mut values = BTreeMap::new();
        values.insert("Residential".to_string(), vec![30.0, 60.0]);
        let split = Adjustment::SectorValues(values).subdivide(3);
        let row = row(&[("Residential", 0.0)]);
        let months: f64 = (0..3).map(|i| split.apply(monthly(i), &row).unwrap()["Residential"]).sum();
        assert!((months - 30.0).abs() < 1e-12);
        assert!((split.apply(monthly(5), &row).unwrap()["Residential"] - 20.0).abs() < 1e-12);

        let by_year = Adjustment::FiscalYearDeclines(BTreeMap::new());
        assert_eq!(by_year.subdivide(3), by_year);
        assert_eq!(declines.subdivide(1), declines);
    }

    #[test]
    fn test_subdivided_recovery_matches_at_quarter_starts() {
        let mut initial = BTreeMap::new();
        initial.insert("Hotels".to_string(), 0.5);
        let quarterly = Adjustment::RecoveryCurve {
            initial,
            impacted: vec![],
            impacted_recovery: 0.0,
            default_recovery: 0.2,
            hold_periods: 2,
            speed: 1.0,
        };
        let monthly = quarterly.subdivide(3);
        let baseline = row(&[("Hotels", 100.0)]);
        let at = |adj: &Adjustment, index| {
            let p = Period { date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), index, count: 18 };
            adj.apply(p, &baseline).unwrap()["Hotels"]
        };

        // Still held in the last month of the second quarter
        assert_eq!(at(&monthly, 5), 50.0);
        for quarter in 0..6 {
            assert!((at(&monthly, quarter * 3) - at(&quarterly, quarter)).abs() < 1e-9);
        }
        // Months between quarter starts recover gradually
        assert!(at(&monthly, 7) > at(&monthly, 6));
        assert!(at(&monthly, 7) < at(&monthly, 9));
    }

    #[test]
    fn test_recovery_curve_decays_after_hold() {
        let mut initial = BTreeMap::new();
        initial.insert("Hotels".to_string(), 0.5);
        initial.insert("Government".to_string(), 0.2);
        let adj = Adjustment::RecoveryCurve {
            initial,
            impacted: vec!["Hotels".to_string()],
            impacted_recovery: 0.5,
            default_recovery: 0.0,
            hold_periods: 2,
            speed: 1.0,
        };
        let baseline = row(&[("Hotels", 100.0), ("Government", 100.0)]);

        assert_eq!(adj.apply(period(1), &baseline).unwrap()["Hotels"], 50.0);
        let later = adj.apply(period(2), &baseline).unwrap();
        // 0.5 * 0.5^2 = 0.125
        assert!((later["Hotels"] - 87.5).abs() < 1e-12);
        assert!((later["Government"] - 80.0).abs() < 1e-12);
    }
}

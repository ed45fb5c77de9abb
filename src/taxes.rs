//! Definitions of the city tax forecasts
//!
//! Each tax pairs baseline fitting options with one adjustment per scenario.
//! Per-period assumptions cover the six quarters from January 2021 through
//! June 2022. Monthly runs spread each quarter over its three months.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::baseline::{BaselineConfig, BaselineForecast, FitOptions};
use crate::collections::{DataSource, TaxName};
use crate::config::ForecastConfig;
use crate::error::Result;
use crate::fiscal::Frequency;
use crate::scenario::{Adjustment, RevenueForecast, DEFAULT_GROUP};

/// Baseline settings and scenario assumptions for one tax
#[derive(Debug, Clone, PartialEq)]
pub struct TaxDefinition {
    pub baseline: BaselineConfig,
    pub forecast_start: NaiveDate,
    pub forecast_stop: NaiveDate,
    pub assumptions: BTreeMap<String, Adjustment>,
}

impl TaxDefinition {
    pub fn tax(&self) -> TaxName {
        self.baseline.tax
    }

    /// Fit the baseline and attach the scenario assumptions
    pub fn build(&self, data: &dyn DataSource) -> Result<RevenueForecast> {
        let baseline = BaselineForecast::fit(self.baseline.clone(), data)?;
        Ok(RevenueForecast::new(
            baseline,
            self.forecast_start,
            self.forecast_stop,
            self.assumptions.clone(),
        ))
    }
}

/// Frequency of the built-in per-period assumptions
pub const ASSUMPTION_FREQ: Frequency = Frequency::Quarterly;

/// Definitions of every configured tax, in alphabetical order
pub fn definitions(config: &ForecastConfig) -> Vec<TaxDefinition> {
    config
        .sorted_taxes()
        .into_iter()
        .map(|tax| definition(tax, config))
        .collect()
}

/// Definition of a single tax under the given run settings
pub fn definition(tax: TaxName, config: &ForecastConfig) -> TaxDefinition {
    let (fit_options, ignore_sectors, assumptions) = match tax {
        TaxName::Amusement => (
            FitOptions::multiplicative(),
            false,
            scenario_map(
                Adjustment::Declines(vec![0.9, 0.7, 0.5, 0.3, 0.1, 0.0]),
                Adjustment::Declines(vec![0.9, 0.8, 0.7, 0.5, 0.3, 0.1]),
            ),
        ),
        TaxName::Birt => (
            FitOptions::additive().with_flat_growth(true),
            true,
            scenario_map(
                Adjustment::FiscalYearDeclines(year_map(&[(2020, 0.0), (2021, 0.075), (2022, -0.05)])),
                Adjustment::FiscalYearDeclines(year_map(&[(2020, 0.0), (2021, 0.15), (2022, 0.0)])),
            ),
        ),
        TaxName::Npt => (
            FitOptions::additive(),
            false,
            scenario_map(
                Adjustment::CalendarYearDeclines(year_map(&[(2020, 0.1), (2021, 0.15), (2022, 0.05)])),
                Adjustment::CalendarYearDeclines(year_map(&[(2020, 0.1), (2021, 0.2), (2022, 0.1)])),
            ),
        ),
        TaxName::Parking => (
            FitOptions::multiplicative().with_flat_growth(true),
            false,
            scenario_map(
                Adjustment::Declines(vec![0.5, 0.4, 0.3, 0.2, 0.1, 0.1]),
                Adjustment::Declines(vec![0.5, 0.5, 0.4, 0.3, 0.3, 0.2]),
            ),
        ),
        TaxName::Rtt => (
            FitOptions::additive().with_flat_growth(true),
            false,
            scenario_map(rtt_values("moderate"), rtt_values("severe")),
        ),
        TaxName::Sales => (
            FitOptions::multiplicative().with_flat_growth(true),
            false,
            scenario_map(sales_declines("moderate"), sales_declines("severe")),
        ),
        TaxName::Soda => (
            FitOptions::additive(),
            false,
            scenario_map(
                Adjustment::Declines(vec![0.05, 0.05, 0.05, 0.0, 0.0, 0.025]),
                Adjustment::Declines(vec![0.1, 0.1, 0.1, 0.05, 0.05, 0.0]),
            ),
        ),
        TaxName::Wage => (
            FitOptions::multiplicative().with_flat_growth(true),
            false,
            scenario_map(wage_recovery("moderate"), wage_recovery("severe")),
        ),
    };

    let parts = (ASSUMPTION_FREQ.months() / config.freq.months()) as usize;
    let assumptions = assumptions
        .into_iter()
        .map(|(scenario, adjustment)| (scenario, adjustment.subdivide(parts)))
        .collect();

    let mut baseline = BaselineConfig::new(tax, config.freq);
    baseline.fit_start = config.baseline_start;
    baseline.fit_stop = config.baseline_stop;
    baseline.horizon = config.horizon;
    baseline.ignore_sectors = ignore_sectors;
    baseline.fresh = config.fresh;
    baseline.cache_dir = config.cache_dir.clone();
    baseline.fit_options = FitOptions {
        seed: config.seed,
        uncertainty_samples: config.uncertainty_samples,
        ..fit_options
    };

    TaxDefinition {
        baseline,
        forecast_start: config.forecast_start,
        forecast_stop: config.forecast_stop,
        assumptions,
    }
}

fn scenario_map(moderate: Adjustment, severe: Adjustment) -> BTreeMap<String, Adjustment> {
    let mut out = BTreeMap::new();
    out.insert("moderate".to_string(), moderate);
    out.insert("severe".to_string(), severe);
    out
}

fn year_map(pairs: &[(i32, f64)]) -> BTreeMap<i32, f64> {
    pairs.iter().copied().collect()
}

fn sector_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
}

/// Sectors of the sales tax hit hardest by closures
pub const SALES_IMPACTED: [&str; 3] = [
    "Hotels",
    "Restaurants, bars, concessionaires and caterers",
    "Motor Vehicle Sales Tax",
];

fn sales_declines(scenario: &str) -> Adjustment {
    let (impacted, default) = if scenario == "severe" {
        (
            vec![0.30, 0.30, 0.25, 0.2, 0.15, 0.125],
            vec![0.03, 0.03, 0.02, 0.02, 0.01, 0.01],
        )
    } else {
        (
            vec![0.25, 0.20, 0.15, 0.10, 0.05, 0.05],
            vec![0.03, 0.02, 0.01, 0.01, 0.01, 0.0],
        )
    };

    let mut groups = BTreeMap::new();
    groups.insert(
        "impacted".to_string(),
        SALES_IMPACTED.iter().map(|s| s.to_string()).collect(),
    );
    let mut declines = BTreeMap::new();
    declines.insert("impacted".to_string(), impacted);
    declines.insert(DEFAULT_GROUP.to_string(), default);
    Adjustment::SectorDeclines { groups, declines }
}

/// Realty transfer tax sectors projected directly
pub const RTT_SECTORS: [&str; 2] = ["Non-Residential", "Residential"];

fn rtt_values(scenario: &str) -> Adjustment {
    let (residential, non_residential) = if scenario == "severe" {
        (
            vec![
                52458286.70835801,
                59213671.75955736,
                66204647.623281255,
                59725736.97083543,
                59811270.67657426,
                67513545.93516353,
            ],
            vec![
                13605226.151016003,
                14016103.980776686,
                14297827.670790298,
                14440805.947498202,
                14585214.006973183,
                14731066.147042917,
            ],
        )
    } else {
        (
            vec![
                58921540.64579399,
                66840131.486353144,
                70930906.51609391,
                64307830.926559515,
                64541043.654096015,
                73214851.42486982,
            ],
            vec![
                16430490.674820002,
                17094282.49808273,
                17610529.82952483,
                17964501.47909828,
                18144146.49388926,
                18325587.95882815,
            ],
        )
    };

    let mut values = BTreeMap::new();
    values.insert("Residential".to_string(), residential);
    values.insert("Non-Residential".to_string(), non_residential);
    Adjustment::SectorValues(values)
}

/// Wage tax sectors that recover more slowly
pub const WAGE_IMPACTED: [&str; 6] = [
    "Arts, Entertainment, and Other Recreation",
    "Hotels",
    "Restaurants",
    "Retail Trade",
    "Sport Teams",
    "Wholesale Trade",
];

/// Wage tax sectors with their moderate and severe initial declines
pub const WAGE_SECTORS: [(&str, f64, f64); 22] = [
    ("Arts, Entertainment, and Other Recreation", 0.25, 0.5),
    ("Banking & Credit Unions", 0.05, 0.1),
    ("Construction", 0.1, 0.2),
    ("Education", 0.1, 0.2),
    ("Government", 0.03, 0.05),
    ("Health and Social Services", 0.1, 0.2),
    ("Hotels", 0.25, 0.5),
    ("Insurance", 0.05, 0.1),
    ("Manufacturing", 0.15, 0.3),
    ("Other Sectors", 0.15, 0.3),
    ("Professional Services", 0.05, 0.1),
    ("Public Utilities", 0.05, 0.1),
    ("Publishing, Broadcasting, and Other Information", 0.05, 0.1),
    ("Real Estate, Rental and Leasing", 0.05, 0.1),
    ("Restaurants", 0.7, 0.9),
    ("Retail Trade", 0.25, 0.5),
    ("Securities / Financial Investments", 0.1, 0.2),
    ("Sport Teams", 0.25, 0.5),
    ("Telecommunication", 0.05, 0.1),
    ("Transportation and Warehousing", 0.15, 0.3),
    ("Unclassified Accounts", 0.05, 0.1),
    ("Wholesale Trade", 0.25, 0.5),
];

fn wage_recovery(scenario: &str) -> Adjustment {
    let severe = scenario == "severe";
    let pairs: Vec<(&str, f64)> = WAGE_SECTORS
        .iter()
        .map(|&(sector, moderate, sev)| (sector, if severe { sev } else { moderate }))
        .collect();

    Adjustment::RecoveryCurve {
        initial: sector_map(&pairs),
        impacted: WAGE_IMPACTED.iter().map(|s| s.to_string()).collect(),
        impacted_recovery: if severe { 0.1 } else { 0.15 },
        default_recovery: if severe { 0.2 } else { 0.25 },
        hold_periods: if severe { 3 } else { 2 },
        speed: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::{period_range, Frequency};
    use crate::scenario::Period;

    #[test]
    fn test_every_tax_has_both_scenarios() {
        let config = ForecastConfig::default();
        let defs = definitions(&config);
        assert_eq!(defs.len(), 8);
        for def in &defs {
            let names: Vec<&String> = def.assumptions.keys().collect();
            assert_eq!(names, vec!["moderate", "severe"], "{}", def.tax());
        }
    }

    #[test]
    fn test_per_period_assumptions_match_window() {
        let config = ForecastConfig::default();
        let periods = period_range(config.forecast_start, config.forecast_stop, Frequency::Quarterly).len();
        assert_eq!(periods, 6);

        for def in definitions(&config) {
            for adjustment in def.assumptions.values() {
                match adjustment {
                    Adjustment::Declines(d) => assert_eq!(d.len(), periods),
                    Adjustment::SectorDeclines { declines, .. } => {
                        assert!(declines.values().all(|d| d.len() == periods))
                    }
                    Adjustment::SectorValues(values) => {
                        assert!(values.values().all(|v| v.len() == periods))
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_monthly_runs_expand_quarterly_assumptions() {
        let config = ForecastConfig {
            freq: Frequency::Monthly,
            ..ForecastConfig::default()
        };
        let months = period_range(config.forecast_start, config.forecast_stop, Frequency::Monthly).len();
        assert_eq!(months, 18);

        let soda = definition(TaxName::Soda, &config);
        match &soda.assumptions["severe"] {
            Adjustment::Declines(d) => {
                assert_eq!(d.len(), months);
                assert_eq!(&d[..4], &[0.1, 0.1, 0.1, 0.1]);
            }
            other => panic!("unexpected soda assumption {:?}", other),
        }

        let quarterly = definition(TaxName::Rtt, &ForecastConfig::default());
        let monthly = definition(TaxName::Rtt, &config);
        match (&quarterly.assumptions["moderate"], &monthly.assumptions["moderate"]) {
            (Adjustment::SectorValues(q), Adjustment::SectorValues(m)) => {
                let q = &q["Residential"];
                let m = &m["Residential"];
                assert_eq!(m.len(), months);
                approx::assert_relative_eq!(m[0] + m[1] + m[2], q[0], max_relative = 1e-12);
            }
            other => panic!("unexpected rtt assumptions {:?}", other),
        }

        match &definition(TaxName::Wage, &config).assumptions["severe"] {
            Adjustment::RecoveryCurve { hold_periods, .. } => assert_eq!(*hold_periods, 9),
            other => panic!("unexpected wage assumption {:?}", other),
        }
    }

    #[test]
    fn test_run_settings_flow_into_baseline() {
        let config = ForecastConfig {
            seed: 9,
            uncertainty_samples: 25,
            fresh: true,
            cache_dir: None,
            ..ForecastConfig::default()
        };
        let birt = definition(TaxName::Birt, &config);
        assert!(birt.baseline.ignore_sectors);
        assert!(birt.baseline.fit_options.flat_growth);
        assert_eq!(birt.baseline.fit_options.seed, 9);
        assert_eq!(birt.baseline.fit_options.uncertainty_samples, 25);
        assert!(birt.baseline.fresh);
        assert_eq!(birt.baseline.cache_dir, None);
        assert_eq!(birt.baseline.fit_start, config.baseline_start);
    }

    #[test]
    fn test_wage_severe_holds_longer() {
        let def = definition(TaxName::Wage, &ForecastConfig::default());
        let row: BTreeMap<String, f64> = [("Restaurants".to_string(), 100.0)].into_iter().collect();
        let period = |index| Period {
            date: NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
            index,
            count: 6,
        };

        let moderate = &def.assumptions["moderate"];
        let severe = &def.assumptions["severe"];
        // Moderate starts recovering in the third quarter, severe holds
        let m = moderate.apply(period(2), &row).unwrap()["Restaurants"];
        let s = severe.apply(period(2), &row).unwrap()["Restaurants"];
        approx::assert_relative_eq!(m, 100.0 * (1.0 - 0.7 * 0.85f64.powi(2)), epsilon = 1e-9);
        approx::assert_relative_eq!(s, 10.0, epsilon = 1e-9);
    }
}

//! Synthetic input data in the CSV layout read by [`CsvDataSource`]
//!
//! Collections follow a linear trend with a yearly cycle and seeded noise.
//! Sector names match the scenario assumptions so every tax can be run
//! end to end without the city's exports.
//!
//! [`CsvDataSource`]: super::CsvDataSource

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use super::data::TaxName;
use crate::error::{ForecastError, Result};
use crate::fiscal::{add_periods, fiscal_year, period_offset, Frequency};
use crate::taxes::{RTT_SECTORS, SALES_IMPACTED, WAGE_SECTORS};

/// First month of generated collections
pub fn sample_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2013, 7, 1).unwrap_or(NaiveDate::MIN)
}

/// Last month of generated collections
pub fn sample_stop() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, 1).unwrap_or(NaiveDate::MAX)
}

#[derive(Debug, Serialize)]
struct CollectionRow {
    tax: &'static str,
    date: String,
    total: f64,
}

#[derive(Debug, Serialize)]
struct SectorRow<'a> {
    tax: &'static str,
    fiscal_year: i32,
    month: Option<u32>,
    sector: &'a str,
    parent_sector: Option<&'a str>,
    total: f64,
}

#[derive(Debug, Default, Serialize)]
struct RateRow {
    fiscal_year: i32,
    rate: Option<f64>,
    rate_resident: Option<f64>,
    rate_nonresident: Option<f64>,
    rate_net_income: Option<f64>,
    rate_gross_receipts: Option<f64>,
}

/// Shape of a tax's monthly collections
struct Profile {
    tax: TaxName,
    /// Collections in the first month, in dollars
    level: f64,
    /// Growth per year as a share of `level`
    growth: f64,
    /// Amplitude of the yearly cycle as a share of `level`
    seasonal: f64,
    /// Month of the seasonal peak
    peak_month: u32,
}

const PROFILES: [Profile; 8] = [
    Profile { tax: TaxName::Amusement, level: 2.0e6, growth: 0.03, seasonal: 0.25, peak_month: 12 },
    Profile { tax: TaxName::Birt, level: 35.0e6, growth: 0.02, seasonal: 0.8, peak_month: 4 },
    Profile { tax: TaxName::Npt, level: 2.5e6, growth: 0.02, seasonal: 0.7, peak_month: 4 },
    Profile { tax: TaxName::Parking, level: 8.0e6, growth: 0.025, seasonal: 0.1, peak_month: 12 },
    Profile { tax: TaxName::Rtt, level: 22.0e6, growth: 0.06, seasonal: 0.2, peak_month: 7 },
    Profile { tax: TaxName::Sales, level: 15.0e6, growth: 0.03, seasonal: 0.12, peak_month: 12 },
    Profile { tax: TaxName::Soda, level: 6.5e6, growth: 0.0, seasonal: 0.08, peak_month: 7 },
    Profile { tax: TaxName::Wage, level: 130.0e6, growth: 0.035, seasonal: 0.06, peak_month: 12 },
];

/// Sectors of the sales tax that carry no special assumptions
const SALES_OTHER: [&str; 3] = ["Retail", "Wholesale", "Other"];

/// Write collections.csv, sectors.csv and rates/<tax>.csv under `dir`
pub fn write_sample_data(dir: &Path, seed: u64) -> Result<()> {
    fs::create_dir_all(dir.join("rates"))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.02).map_err(|e| ForecastError::Config(e.to_string()))?;

    let mut writer = csv::Writer::from_path(dir.join("collections.csv"))?;
    let months = period_offset(sample_start(), sample_stop(), Frequency::Monthly);
    for profile in &PROFILES {
        for i in 0..=months as u32 {
            let date = add_periods(sample_start(), i, Frequency::Monthly);
            let years = i as f64 / 12.0;
            let phase = 2.0 * PI * (date.month() as f64 - profile.peak_month as f64) / 12.0;
            let mut total = profile.level
                * (1.0 + profile.growth * years)
                * (1.0 + profile.seasonal * phase.cos())
                * (1.0 + noise.sample(&mut rng));
            if date.year() == 2020 && date.month() == 7 {
                // Filing deadline moved from April to July 2020
                total += profile.tax.filing_shift_accrual().unwrap_or(0.0);
            }
            writer.serialize(CollectionRow {
                tax: profile.tax.as_str(),
                date: date.format("%Y-%m-%d").to_string(),
                total,
            })?;
        }
    }
    writer.flush()?;

    write_sectors(dir, &mut rng)?;
    write_rates(dir)?;

    info!("Wrote sample data to {}", dir.display());
    Ok(())
}

fn write_sectors(dir: &Path, rng: &mut StdRng) -> Result<()> {
    let drift = Normal::new(0.0, 0.05).map_err(|e| ForecastError::Config(e.to_string()))?;
    let mut writer = csv::Writer::from_path(dir.join("sectors.csv"))?;

    let wage: Vec<&str> = WAGE_SECTORS.iter().map(|(s, _, _)| *s).collect();
    let sales: Vec<&str> = SALES_IMPACTED.iter().chain(SALES_OTHER.iter()).copied().collect();
    let rtt: Vec<&str> = RTT_SECTORS.iter().copied().chain(["Unclassified"]).collect();
    let birt = ["Financial", "Services", "Trade", "Other"];

    let first = fiscal_year(sample_start());
    let last = fiscal_year(sample_stop());
    for (tax, sectors) in [
        (TaxName::Birt, birt.to_vec()),
        (TaxName::Rtt, rtt),
        (TaxName::Sales, sales),
        (TaxName::Wage, wage),
    ] {
        for fy in first..=last {
            for (i, sector) in sectors.iter().enumerate() {
                let weight = (1.0 + i as f64 * 0.3) * (1.0 + drift.sample(rng));
                writer.serialize(SectorRow {
                    tax: tax.as_str(),
                    fiscal_year: fy,
                    month: None,
                    sector: *sector,
                    parent_sector: None,
                    total: 1.0e6 * weight.max(0.1),
                })?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_rates(dir: &Path) -> Result<()> {
    let first = fiscal_year(sample_start());
    let last = fiscal_year(sample_stop());

    for tax in TaxName::ALL.iter().filter(|t| t.has_rates()) {
        let mut writer = csv::Writer::from_path(dir.join("rates").join(format!("{}.csv", tax)))?;
        for fy in first..=last {
            let step = (fy - first) as f64;
            let row = match tax {
                TaxName::Wage | TaxName::Npt => RateRow {
                    fiscal_year: fy,
                    rate_resident: Some(0.0392 - 0.0002 * step),
                    rate_nonresident: Some(0.0349 - 0.0001 * step),
                    ..RateRow::default()
                },
                TaxName::Birt => RateRow {
                    fiscal_year: fy,
                    rate_net_income: Some(0.0645 - 0.0003 * step),
                    rate_gross_receipts: Some(0.001415),
                    ..RateRow::default()
                },
                TaxName::Parking => RateRow { fiscal_year: fy, rate: Some(0.225), ..RateRow::default() },
                TaxName::Rtt => RateRow { fiscal_year: fy, rate: Some(0.03 + 0.001 * step), ..RateRow::default() },
                _ => RateRow { fiscal_year: fy, rate: Some(0.02), ..RateRow::default() },
            };
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{CsvDataSource, DataSource};

    #[test]
    fn test_sample_data_loads() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_data(dir.path(), 1).unwrap();
        let data = CsvDataSource::new(dir.path());

        let soda = data.monthly_collections(TaxName::Soda).unwrap();
        assert_eq!(soda.first_date(), NaiveDate::from_ymd_opt(2017, 4, 1).unwrap());
        assert_eq!(soda.last_date(), sample_stop());

        let wage = data.sector_collections(TaxName::Wage, false).unwrap();
        assert_eq!(wage.sectors().len(), WAGE_SECTORS.len());

        // Unclassified realty transfers are dropped on load
        let rtt = data.sector_collections(TaxName::Rtt, false).unwrap();
        assert_eq!(rtt.sectors(), vec!["Non-Residential", "Residential"]);

        let rates = data.tax_rates(TaxName::Wage).unwrap().unwrap();
        assert_eq!(rates.last_fiscal_year(), 2021);
        assert!(data.tax_rates(TaxName::Amusement).unwrap().is_none());
    }

    #[test]
    fn test_birt_accrual_lands_in_april() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_data(dir.path(), 1).unwrap();
        let birt = CsvDataSource::new(dir.path()).monthly_collections(TaxName::Birt).unwrap();

        let april = birt.monthly()[&NaiveDate::from_ymd_opt(2020, 4, 1).unwrap()];
        let july = birt.monthly()[&NaiveDate::from_ymd_opt(2020, 7, 1).unwrap()];
        assert!(april > 200.0e6);
        assert!(july < 100.0e6);
    }
}

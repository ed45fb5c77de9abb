//! CSV loaders for collections, sector breakdowns and tax rates
//!
//! Expected layout of a data directory:
//!
//! ```text
//! <data>/collections.csv      tax,date,total
//! <data>/sectors.csv          tax,fiscal_year,month,sector,parent_sector,total
//! <data>/rates/<tax>.csv      fiscal_year,rate  (or component rate columns)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::Reader;
use log::{debug, warn};

use super::data::{HistoricalSeries, SectorCollections, SectorRecord, TaxName, TaxRates};
use crate::error::{ForecastError, Result};
use crate::fiscal::{month_start, parse_date};
use crate::frame::DatedSeries;

/// Default location of the input data
pub const DEFAULT_DATA_PATH: &str = "data";

/// Sector excluded from realty transfer tax shares
const RTT_UNCLASSIFIED: &str = "Unclassified";

/// Raw row of collections.csv
#[derive(Debug, serde::Deserialize)]
struct CollectionRow {
    tax: String,
    date: String,
    total: Option<f64>,
}

/// Raw row of sectors.csv
#[derive(Debug, serde::Deserialize)]
struct SectorRow {
    tax: String,
    fiscal_year: i32,
    month: Option<u32>,
    sector: String,
    parent_sector: Option<String>,
    total: Option<f64>,
}

/// Raw row of rates/<tax>.csv
#[derive(Debug, serde::Deserialize)]
struct RateRow {
    fiscal_year: i32,
    rate: Option<f64>,
    rate_resident: Option<f64>,
    rate_nonresident: Option<f64>,
    rate_net_income: Option<f64>,
    rate_gross_receipts: Option<f64>,
}

impl RateRow {
    /// Blend component rates into a single effective rate
    fn effective_rate(&self, tax: TaxName) -> Result<f64> {
        let blended = match tax {
            TaxName::Wage => blend(self.rate_resident, self.rate_nonresident, 0.6),
            TaxName::Npt => blend(self.rate_resident, self.rate_nonresident, 0.515),
            TaxName::Birt => blend(self.rate_net_income, self.rate_gross_receipts, 0.75),
            _ => None,
        };

        blended.or(self.rate).ok_or_else(|| {
            ForecastError::MissingData(format!(
                "no rate for {} in FY{}",
                tax, self.fiscal_year
            ))
        })
    }
}

fn blend(a: Option<f64>, b: Option<f64>, weight: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(weight * a + (1.0 - weight) * b),
        _ => None,
    }
}

/// Source of historical inputs for the baseline pipeline
pub trait DataSource {
    /// Monthly collections for one tax
    fn monthly_collections(&self, tax: TaxName) -> Result<HistoricalSeries>;

    /// Collections by sector for one tax
    fn sector_collections(&self, tax: TaxName, use_subsectors: bool) -> Result<SectorCollections>;

    /// Rate schedule, or `None` for taxes without rates
    fn tax_rates(&self, tax: TaxName) -> Result<Option<TaxRates>>;
}

/// Data source reading CSV exports from a directory
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    root: PathBuf,
}

impl CsvDataSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open(&self, relative: &str) -> Result<std::fs::File> {
        let path = self.root.join(relative);
        std::fs::File::open(&path).map_err(|e| {
            ForecastError::MissingData(format!("cannot open {}: {}", path.display(), e))
        })
    }
}

impl DataSource for CsvDataSource {
    fn monthly_collections(&self, tax: TaxName) -> Result<HistoricalSeries> {
        load_monthly_collections(self.open("collections.csv")?, tax)
    }

    fn sector_collections(&self, tax: TaxName, use_subsectors: bool) -> Result<SectorCollections> {
        load_sector_collections(self.open("sectors.csv")?, tax, use_subsectors)
    }

    fn tax_rates(&self, tax: TaxName) -> Result<Option<TaxRates>> {
        if !tax.has_rates() {
            return Ok(None);
        }
        let file = self.open(&format!("rates/{}.csv", tax))?;
        load_tax_rates(file, tax).map(Some)
    }
}

/// Load monthly collections for one tax from any reader
///
/// Line items making up the tax are summed by month; soda rows before the
/// tax took effect are dropped; BIRT and NPT accruals are moved from July
/// 2020 back to April 2020.
pub fn load_monthly_collections<R: Read>(reader: R, tax: TaxName) -> Result<HistoricalSeries> {
    let mut csv_reader = Reader::from_reader(reader);
    let names = tax.collection_names();
    let mut monthly = DatedSeries::new();

    for result in csv_reader.deserialize() {
        let row: CollectionRow = result?;
        if !names.contains(&row.tax.trim().to_lowercase().as_str()) {
            continue;
        }
        let Some(total) = row.total else {
            continue;
        };
        let date = month_start(parse_date(&row.date)?);
        *monthly.entry(date).or_insert(0.0) += total;
    }

    if let Some(first) = tax.first_collection_month() {
        monthly.retain(|date, _| *date >= first);
    }

    if let Some(accrual) = tax.filing_shift_accrual() {
        shift_accrual(&mut monthly, accrual);
    }

    debug!("Loaded {} months of {} collections", monthly.len(), tax);
    HistoricalSeries::new(tax, monthly)
}

fn shift_accrual(monthly: &mut DatedSeries, accrual: f64) {
    let july = NaiveDate::from_ymd_opt(2020, 7, 1);
    let april = NaiveDate::from_ymd_opt(2020, 4, 1);

    if let Some(value) = july.and_then(|d| monthly.get_mut(&d)) {
        *value -= accrual;
    }
    if let Some(value) = april.and_then(|d| monthly.get_mut(&d)) {
        *value += accrual;
    }
}

/// Load collections by sector for one tax from any reader
///
/// Main sectors are rows without a parent; with `use_subsectors` the rows
/// whose sector is itself a parent are dropped instead.
pub fn load_sector_collections<R: Read>(
    reader: R,
    tax: TaxName,
    use_subsectors: bool,
) -> Result<SectorCollections> {
    if !tax.has_sector_data() {
        return Err(ForecastError::MissingData(format!(
            "no sector data published for {}",
            tax
        )));
    }

    let mut csv_reader = Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize() {
        let row: SectorRow = result?;
        if row.tax.trim().eq_ignore_ascii_case(tax.as_str()) {
            rows.push(row);
        }
    }

    let parents: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.parent_sector.clone())
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut records = Vec::new();
    for row in rows {
        let has_parent = row
            .parent_sector
            .as_ref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);

        let keep = if use_subsectors {
            !parents.contains(&row.sector)
        } else {
            !has_parent
        };
        if !keep {
            continue;
        }
        if tax == TaxName::Rtt && row.sector == RTT_UNCLASSIFIED {
            continue;
        }
        let Some(total) = row.total else {
            warn!("Skipping {} sector '{}' FY{} with no total", tax, row.sector, row.fiscal_year);
            continue;
        };

        records.push(SectorRecord {
            fiscal_year: row.fiscal_year,
            month: row.month,
            sector: row.sector,
            total,
        });
    }

    SectorCollections::new(records)
}

/// Load a tax rate schedule from any reader
pub fn load_tax_rates<R: Read>(reader: R, tax: TaxName) -> Result<TaxRates> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut rates = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: RateRow = result?;
        rates.insert(row.fiscal_year, row.effective_rate(tax)?);
    }

    TaxRates::new(rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTIONS: &str = "\
tax,date,total
wage,2020-03-01,100
earnings,2020-03-01,20
wage,2020-04-15,90
soda,2017-03-01,5
soda,2017-04-01,6
birt,2020-04-01,50
birt,2020-07-01,300000000
parking,2020-03-01,
";

    #[test]
    fn test_wage_sums_earnings() {
        let series = load_monthly_collections(COLLECTIONS.as_bytes(), TaxName::Wage).unwrap();
        let d = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        assert_eq!(series.monthly()[&d], 120.0);
        // Mid-month dates snap to the first of the month
        let april = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        assert_eq!(series.monthly()[&april], 90.0);
    }

    #[test]
    fn test_soda_trimmed_to_start() {
        let series = load_monthly_collections(COLLECTIONS.as_bytes(), TaxName::Soda).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2017, 4, 1).unwrap());
    }

    #[test]
    fn test_birt_accrual_shift() {
        let series = load_monthly_collections(COLLECTIONS.as_bytes(), TaxName::Birt).unwrap();
        let april = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        let july = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        assert_eq!(series.monthly()[&april], 50.0 + 261_024_311.0);
        assert_eq!(series.monthly()[&july], 300_000_000.0 - 261_024_311.0);
    }

    #[test]
    fn test_missing_totals_make_empty_series() {
        assert!(load_monthly_collections(COLLECTIONS.as_bytes(), TaxName::Parking).is_err());
    }

    #[test]
    fn test_sector_parent_filtering() {
        let data = "\
tax,fiscal_year,month,sector,parent_sector,total
sales,2019,,Retail,,100
sales,2019,,Clothing,Retail,40
sales,2019,,Food,Retail,60
sales,2019,,Hotels,,50
rtt,2019,,Unclassified,,5
rtt,2019,,Residential,,95
";
        let main = load_sector_collections(data.as_bytes(), TaxName::Sales, false).unwrap();
        assert_eq!(main.sectors(), vec!["Hotels", "Retail"]);

        let sub = load_sector_collections(data.as_bytes(), TaxName::Sales, true).unwrap();
        assert_eq!(sub.sectors(), vec!["Clothing", "Food", "Hotels"]);

        let rtt = load_sector_collections(data.as_bytes(), TaxName::Rtt, false).unwrap();
        assert_eq!(rtt.sectors(), vec!["Residential"]);
    }

    #[test]
    fn test_sector_data_not_published() {
        let data = "tax,fiscal_year,month,sector,parent_sector,total\n";
        assert!(load_sector_collections(data.as_bytes(), TaxName::Soda, false).is_err());
    }

    #[test]
    fn test_blended_rates() {
        let data = "\
fiscal_year,rate_resident,rate_nonresident
2020,0.038712,0.034481
";
        let rates = load_tax_rates(data.as_bytes(), TaxName::Wage).unwrap();
        let expected = 0.6 * 0.038712 + 0.4 * 0.034481;
        assert!((rates.rate_for(2020) - expected).abs() < 1e-12);

        let missing = "fiscal_year,rate\n2020,\n";
        assert!(load_tax_rates(missing.as_bytes(), TaxName::Parking).is_err());
    }
}

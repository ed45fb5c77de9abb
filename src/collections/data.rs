//! Historical collections data structures

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::fiscal::fiscal_year;
use crate::frame::DatedSeries;

/// City taxes covered by the forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxName {
    Amusement,
    Birt,
    Npt,
    Parking,
    Rtt,
    Sales,
    Soda,
    Wage,
}

impl TaxName {
    pub const ALL: [TaxName; 8] = [
        TaxName::Amusement,
        TaxName::Birt,
        TaxName::Npt,
        TaxName::Parking,
        TaxName::Rtt,
        TaxName::Sales,
        TaxName::Soda,
        TaxName::Wage,
    ];

    /// Short identifier used in data files and output names
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxName::Amusement => "amusement",
            TaxName::Birt => "birt",
            TaxName::Npt => "npt",
            TaxName::Parking => "parking",
            TaxName::Rtt => "rtt",
            TaxName::Sales => "sales",
            TaxName::Soda => "soda",
            TaxName::Wage => "wage",
        }
    }

    /// Human readable name for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            TaxName::Amusement => "Amusement Tax",
            TaxName::Birt => "BIRT",
            TaxName::Npt => "Net Profits Tax",
            TaxName::Parking => "Parking Tax",
            TaxName::Rtt => "Realty Transfer Tax",
            TaxName::Sales => "Sales Tax",
            TaxName::Soda => "Soda Tax",
            TaxName::Wage => "Wage Tax",
        }
    }

    /// Whether collections by sector are published for this tax
    pub fn has_sector_data(&self) -> bool {
        matches!(self, TaxName::Birt | TaxName::Sales | TaxName::Wage | TaxName::Rtt)
    }

    /// Whether a statutory rate schedule exists for this tax
    pub fn has_rates(&self) -> bool {
        !matches!(self, TaxName::Amusement | TaxName::Soda)
    }

    /// Names of the collection line items summed into this tax
    pub fn collection_names(&self) -> &'static [&'static str] {
        match self {
            TaxName::Wage => &["wage", "earnings"],
            TaxName::Rtt => &["rtt", "real_estate_transfer"],
            TaxName::Npt => &["npt", "net_profits"],
            TaxName::Amusement => &["amusement"],
            TaxName::Birt => &["birt"],
            TaxName::Parking => &["parking"],
            TaxName::Sales => &["sales"],
            TaxName::Soda => &["soda"],
        }
    }

    /// First month with valid collections, if the tax started mid-history
    pub fn first_collection_month(&self) -> Option<NaiveDate> {
        match self {
            TaxName::Soda => NaiveDate::from_ymd_opt(2017, 4, 1),
            _ => None,
        }
    }

    /// Accrual booked in July 2020 that belongs to April 2020
    ///
    /// Filing deadlines moved to July 2020; the June 2020 collections report
    /// gives the amounts to move back.
    pub fn filing_shift_accrual(&self) -> Option<f64> {
        match self {
            TaxName::Birt => Some(261_024_311.0),
            TaxName::Npt => Some(10_737_282.0),
            _ => None,
        }
    }
}

impl fmt::Display for TaxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxName {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        TaxName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ForecastError::UnknownTax(s.to_string()))
    }
}

/// Monthly revenue collections for one tax
///
/// Immutable once loaded; owned by the baseline forecast for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    tax: TaxName,
    monthly: DatedSeries,
}

impl HistoricalSeries {
    /// Build a series, rejecting empty input
    pub fn new(tax: TaxName, monthly: DatedSeries) -> Result<Self> {
        if monthly.is_empty() {
            return Err(ForecastError::MissingData(format!(
                "no monthly collections for {}",
                tax
            )));
        }
        Ok(Self { tax, monthly })
    }

    pub fn tax(&self) -> TaxName {
        self.tax
    }

    pub fn monthly(&self) -> &DatedSeries {
        &self.monthly
    }

    pub fn first_date(&self) -> NaiveDate {
        self.monthly.keys().next().copied().unwrap_or(NaiveDate::MIN)
    }

    pub fn last_date(&self) -> NaiveDate {
        self.monthly.keys().next_back().copied().unwrap_or(NaiveDate::MIN)
    }

    pub fn len(&self) -> usize {
        self.monthly.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty()
    }
}

/// Time key used to look up sector shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShareKey {
    pub fiscal_year: i32,
    pub month: Option<u32>,
}

impl ShareKey {
    /// Key for a date, at month granularity or fiscal-year granularity
    pub fn for_date(date: NaiveDate, monthly: bool) -> Self {
        Self {
            fiscal_year: fiscal_year(date),
            month: if monthly { Some(date.month()) } else { None },
        }
    }
}

/// One row of collections by sector
#[derive(Debug, Clone, PartialEq)]
pub struct SectorRecord {
    pub fiscal_year: i32,
    pub month: Option<u32>,
    pub sector: String,
    pub total: f64,
}

/// Collections by sector, used to split monthly totals across sectors
#[derive(Debug, Clone, PartialEq)]
pub struct SectorCollections {
    records: Vec<SectorRecord>,
}

impl SectorCollections {
    pub fn new(records: Vec<SectorRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(ForecastError::MissingData(
                "no sector collections".to_string(),
            ));
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[SectorRecord] {
        &self.records
    }

    /// Whether shares are published by month (otherwise by fiscal year)
    pub fn is_monthly(&self) -> bool {
        self.records.iter().all(|r| r.month.is_some())
    }

    pub fn sectors(&self) -> Vec<String> {
        let mut sectors: Vec<String> = self.records.iter().map(|r| r.sector.clone()).collect();
        sectors.sort();
        sectors.dedup();
        sectors
    }

    /// Share of collections going to each sector in each period
    pub fn shares(&self) -> BTreeMap<ShareKey, BTreeMap<String, f64>> {
        let monthly = self.is_monthly();
        let mut sums: BTreeMap<ShareKey, BTreeMap<String, f64>> = BTreeMap::new();

        for r in &self.records {
            let key = ShareKey {
                fiscal_year: r.fiscal_year,
                month: if monthly { r.month } else { None },
            };
            *sums.entry(key).or_default().entry(r.sector.clone()).or_insert(0.0) += r.total;
        }

        sums.into_iter()
            .map(|(key, by_sector)| {
                let total: f64 = by_sector.values().sum();
                let shares = by_sector
                    .into_iter()
                    .map(|(s, v)| (s, if total != 0.0 { v / total } else { 0.0 }))
                    .collect();
                (key, shares)
            })
            .collect()
    }
}

/// Statutory rate schedule by fiscal year
#[derive(Debug, Clone, PartialEq)]
pub struct TaxRates {
    rates: BTreeMap<i32, f64>,
}

impl TaxRates {
    pub fn new(rates: BTreeMap<i32, f64>) -> Result<Self> {
        if rates.is_empty() {
            return Err(ForecastError::MissingData("empty rate schedule".to_string()));
        }
        if let Some((fy, rate)) = rates.iter().find(|(_, r)| **r <= 0.0) {
            return Err(ForecastError::Parse(format!(
                "non-positive tax rate {} for FY{}",
                rate, fy
            )));
        }
        Ok(Self { rates })
    }

    /// Rate in effect for a fiscal year
    ///
    /// Years after the end of the schedule use the last known rate; years
    /// before it use the first.
    pub fn rate_for(&self, fiscal_year: i32) -> f64 {
        self.rates
            .range(..=fiscal_year)
            .next_back()
            .or_else(|| self.rates.iter().next())
            .map(|(_, r)| *r)
            .unwrap_or(1.0)
    }

    pub fn last_fiscal_year(&self) -> i32 {
        self.rates.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &f64)> {
        self.rates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_name_parse() {
        assert_eq!("wage".parse::<TaxName>().unwrap(), TaxName::Wage);
        assert_eq!(" RTT ".parse::<TaxName>().unwrap(), TaxName::Rtt);
        assert!("hotel".parse::<TaxName>().is_err());
    }

    #[test]
    fn test_empty_series_rejected() {
        assert!(HistoricalSeries::new(TaxName::Soda, DatedSeries::new()).is_err());
    }

    #[test]
    fn test_sector_shares_sum_to_one() {
        let records = vec![
            SectorRecord { fiscal_year: 2019, month: None, sector: "A".into(), total: 30.0 },
            SectorRecord { fiscal_year: 2019, month: None, sector: "B".into(), total: 10.0 },
            SectorRecord { fiscal_year: 2019, month: None, sector: "A".into(), total: 10.0 },
            SectorRecord { fiscal_year: 2020, month: None, sector: "B".into(), total: 5.0 },
        ];
        let shares = SectorCollections::new(records).unwrap().shares();
        let fy19 = &shares[&ShareKey { fiscal_year: 2019, month: None }];
        assert!((fy19["A"] - 0.8).abs() < 1e-12);
        assert!((fy19["B"] - 0.2).abs() < 1e-12);
        let fy20 = &shares[&ShareKey { fiscal_year: 2020, month: None }];
        assert_eq!(fy20["B"], 1.0);
    }

    #[test]
    fn test_rate_carry_forward() {
        let mut rates = BTreeMap::new();
        rates.insert(2019, 0.02);
        rates.insert(2020, 0.025);
        let rates = TaxRates::new(rates).unwrap();

        assert_eq!(rates.rate_for(2019), 0.02);
        assert_eq!(rates.rate_for(2024), 0.025);
        assert_eq!(rates.rate_for(2010), 0.02);
    }
}

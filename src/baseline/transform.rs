//! Pipeline steps applied before and after fitting

use std::collections::BTreeMap;

use log::warn;

use crate::collections::{SectorCollections, ShareKey, TaxRates};
use crate::fiscal::{aggregate_to_quarters, fiscal_year, Frequency};
use crate::frame::{DatedSeries, SectorFrame};

/// Split monthly totals across sectors using historical sector shares
///
/// Periods without published shares use the most recent earlier shares;
/// periods before the first published shares use the earliest ones.
pub fn disaggregate_by_sector(monthly: &DatedSeries, sectors: &SectorCollections) -> SectorFrame {
    let is_monthly = sectors.is_monthly();
    let shares = sectors.shares();
    let mut out = SectorFrame::new();
    let mut filled = 0usize;

    for (&date, &total) in monthly {
        let key = ShareKey::for_date(date, is_monthly);
        let period_shares = match shares.get(&key) {
            Some(s) => Some(s),
            None => {
                filled += 1;
                shares
                    .range(..key)
                    .next_back()
                    .or_else(|| shares.iter().next())
                    .map(|(_, s)| s)
            }
        };

        if let Some(period_shares) = period_shares {
            for (sector, share) in period_shares {
                out.insert(sector, date, total * share);
            }
        }
    }

    if filled > 0 {
        warn!(
            "Sector shares missing for {} of {} periods; filled from nearest published period",
            filled,
            monthly.len()
        );
    }
    out
}

/// Single-column frame of monthly totals
pub fn reshape_raw_actuals(monthly: &DatedSeries) -> SectorFrame {
    SectorFrame::single(monthly.clone())
}

/// Aggregate each column into calendar quarters when fitting quarterly
pub fn aggregate(frame: &SectorFrame, freq: Frequency) -> SectorFrame {
    match freq {
        Frequency::Monthly => frame.clone(),
        Frequency::Quarterly => frame.map_columns(|_, col| aggregate_to_quarters(col)),
    }
}

/// Optionally group sectors through a crosswalk
pub fn apply_crosswalk(frame: SectorFrame, crosswalk: Option<&BTreeMap<String, Vec<String>>>) -> SectorFrame {
    match crosswalk {
        Some(walk) => frame.crosswalk(walk),
        None => frame,
    }
}

/// Convert revenue to tax base by dividing by the fiscal-year rate
pub fn to_tax_base(frame: &SectorFrame, rates: Option<&TaxRates>) -> SectorFrame {
    match rates {
        Some(rates) => frame.map(|_, date, v| v / rates.rate_for(fiscal_year(date))),
        None => frame.clone(),
    }
}

/// Convert tax base back to revenue
pub fn to_revenue(frame: &SectorFrame, rates: Option<&TaxRates>) -> SectorFrame {
    match rates {
        Some(rates) => frame.map(|_, date, v| v * rates.rate_for(fiscal_year(date))),
        None => frame.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::SectorRecord;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn record(fy: i32, sector: &str, total: f64) -> SectorRecord {
        SectorRecord { fiscal_year: fy, month: None, sector: sector.to_string(), total }
    }

    #[test]
    fn test_disaggregate_preserves_totals() {
        let sectors = SectorCollections::new(vec![
            record(2019, "Hotels", 25.0),
            record(2019, "Retail", 75.0),
            record(2020, "Hotels", 50.0),
            record(2020, "Retail", 50.0),
        ])
        .unwrap();

        let mut monthly = DatedSeries::new();
        monthly.insert(d(2019, 1), 100.0);
        monthly.insert(d(2019, 8), 200.0);
        // FY2022 has no shares and falls back to FY2020
        monthly.insert(d(2021, 9), 40.0);

        let frame = disaggregate_by_sector(&monthly, &sectors);
        assert_eq!(frame.get("Hotels", d(2019, 1)), Some(25.0));
        assert_eq!(frame.get("Hotels", d(2019, 8)), Some(100.0));
        assert_eq!(frame.get("Retail", d(2021, 9)), Some(20.0));
        for (date, total) in frame.total() {
            assert!((total - monthly[&date]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tax_base_round_trip() {
        let mut rates = BTreeMap::new();
        rates.insert(2020, 0.02);
        rates.insert(2021, 0.025);
        let rates = TaxRates::new(rates).unwrap();

        let mut frame = SectorFrame::new();
        frame.insert("total", d(2020, 3), 100.0);
        frame.insert("total", d(2020, 9), 100.0);

        let base = to_tax_base(&frame, Some(&rates));
        assert!((base.get("total", d(2020, 3)).unwrap() - 5000.0).abs() < 1e-9);
        assert!((base.get("total", d(2020, 9)).unwrap() - 4000.0).abs() < 1e-9);

        let back = to_revenue(&base, Some(&rates));
        for date in frame.dates() {
            assert!((back.get("total", date).unwrap() - 100.0).abs() < 1e-9);
        }
        assert_eq!(to_tax_base(&frame, None), frame);
    }

    #[test]
    fn test_quarterly_aggregation_per_column() {
        let mut frame = SectorFrame::new();
        for m in 1..=4 {
            frame.insert("A", d(2020, m), 1.0);
            frame.insert("B", d(2020, m), 2.0);
        }
        let q = aggregate(&frame, Frequency::Quarterly);
        assert_eq!(q.dates(), vec![d(2020, 1)]);
        assert_eq!(q.get("B", d(2020, 1)), Some(6.0));
    }
}

//! Dated values keyed by sector
//!
//! Baselines and forecasts for sector-based taxes carry one column per
//! sector; single-series taxes use one column named [`TOTAL_COLUMN`].

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column name used when a tax has no sector detail
pub const TOTAL_COLUMN: &str = "total";

/// A single dated series
pub type DatedSeries = BTreeMap<NaiveDate, f64>;

/// Dated values with one column per sector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorFrame {
    columns: BTreeMap<String, DatedSeries>,
}

impl SectorFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame with a single `total` column
    pub fn single(series: DatedSeries) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(TOTAL_COLUMN.to_string(), series);
        Self { columns }
    }

    pub fn insert(&mut self, sector: &str, date: NaiveDate, value: f64) {
        self.columns
            .entry(sector.to_string())
            .or_default()
            .insert(date, value);
    }

    pub fn insert_column(&mut self, sector: &str, series: DatedSeries) {
        self.columns.insert(sector.to_string(), series);
    }

    pub fn column(&self, sector: &str) -> Option<&DatedSeries> {
        self.columns.get(sector)
    }

    pub fn get(&self, sector: &str, date: NaiveDate) -> Option<f64> {
        self.columns.get(sector).and_then(|c| c.get(&date).copied())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &DatedSeries)> {
        self.columns.iter()
    }

    pub fn sectors(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(|c| c.is_empty())
    }

    /// Sorted union of dates across all columns
    pub fn dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self
            .columns
            .values()
            .flat_map(|c| c.keys().copied())
            .collect();
        dates.into_iter().collect()
    }

    /// Values of every sector on one date
    pub fn row(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .filter_map(|(sector, col)| col.get(&date).map(|v| (sector.clone(), *v)))
            .collect()
    }

    /// Sum over sectors for each date
    pub fn total(&self) -> DatedSeries {
        let mut out = DatedSeries::new();
        for col in self.columns.values() {
            for (&date, &value) in col {
                *out.entry(date).or_insert(0.0) += value;
            }
        }
        out
    }

    /// Apply `f(sector, date, value)` to every cell
    pub fn map<F>(&self, mut f: F) -> SectorFrame
    where
        F: FnMut(&str, NaiveDate, f64) -> f64,
    {
        let columns = self
            .columns
            .iter()
            .map(|(sector, col)| {
                let mapped = col.iter().map(|(&d, &v)| (d, f(sector, d, v))).collect();
                (sector.clone(), mapped)
            })
            .collect();
        SectorFrame { columns }
    }

    /// Keep only dates inside `range`
    pub fn slice(&self, range: RangeInclusive<NaiveDate>) -> SectorFrame {
        let columns = self
            .columns
            .iter()
            .map(|(sector, col)| {
                let sliced = col.range(range.clone()).map(|(&d, &v)| (d, v)).collect();
                (sector.clone(), sliced)
            })
            .collect();
        SectorFrame { columns }
    }

    /// Keep dates up to and including `stop`
    pub fn until(&self, stop: NaiveDate) -> SectorFrame {
        self.slice(NaiveDate::MIN..=stop)
    }

    /// Apply `f` to each column as a whole
    pub fn map_columns<F>(&self, mut f: F) -> SectorFrame
    where
        F: FnMut(&str, &DatedSeries) -> DatedSeries,
    {
        let columns = self
            .columns
            .iter()
            .map(|(sector, col)| (sector.clone(), f(sector, col)))
            .collect();
        SectorFrame { columns }
    }

    /// Sum existing columns into new groups
    ///
    /// Each key of `crosswalk` becomes a column equal to the sum of the listed
    /// source columns; source columns not listed anywhere are dropped.
    pub fn crosswalk(&self, crosswalk: &BTreeMap<String, Vec<String>>) -> SectorFrame {
        let mut out = SectorFrame::new();
        for (group, members) in crosswalk {
            let mut series = DatedSeries::new();
            for member in members {
                if let Some(col) = self.columns.get(member) {
                    for (&date, &value) in col {
                        *series.entry(date).or_insert(0.0) += value;
                    }
                }
            }
            out.insert_column(group, series);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn frame() -> SectorFrame {
        let mut f = SectorFrame::new();
        f.insert("Hotels", d(2020, 1), 10.0);
        f.insert("Hotels", d(2020, 2), 12.0);
        f.insert("Retail", d(2020, 1), 5.0);
        f.insert("Retail", d(2020, 2), 6.0);
        f.insert("Wholesale", d(2020, 2), 1.0);
        f
    }

    #[test]
    fn test_total_sums_sectors() {
        let total = frame().total();
        assert_eq!(total[&d(2020, 1)], 15.0);
        assert_eq!(total[&d(2020, 2)], 19.0);
    }

    #[test]
    fn test_slice_and_until() {
        let f = frame();
        assert_eq!(f.until(d(2020, 1)).dates(), vec![d(2020, 1)]);
        assert_eq!(f.slice(d(2020, 2)..=d(2020, 2)).total()[&d(2020, 2)], 19.0);
    }

    #[test]
    fn test_crosswalk() {
        let mut walk = BTreeMap::new();
        walk.insert(
            "Trade".to_string(),
            vec!["Retail".to_string(), "Wholesale".to_string()],
        );
        walk.insert("Leisure".to_string(), vec!["Hotels".to_string()]);

        let grouped = frame().crosswalk(&walk);
        assert_eq!(grouped.sectors(), vec!["Leisure", "Trade"]);
        assert_eq!(grouped.get("Trade", d(2020, 2)), Some(7.0));
        assert_eq!(grouped.total(), frame().total());
    }
}

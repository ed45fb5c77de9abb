//! Typed report tables
//!
//! Rows are keyed by one or more labels (e.g. tax and kind) and columns by
//! date or fiscal year. Cells are optional; a missing value is written as an
//! empty cell.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::NaiveDate;

use crate::error::Result;
use crate::fiscal::{fiscal_year, quarter_start};
use crate::frame::DatedSeries;

/// Label of the row summed over taxes
pub const TOTAL_ROW: &str = "total";

/// Column key of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnKey {
    Date(NaiveDate),
    FiscalYear(i32),
}

impl ColumnKey {
    pub fn header(&self) -> String {
        match self {
            ColumnKey::Date(d) => d.format("%Y-%m-%d").to_string(),
            ColumnKey::FiscalYear(fy) => format!("FY{}", fy),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ColumnKey::Date(d) => Some(*d),
            ColumnKey::FiscalYear(_) => None,
        }
    }
}

/// One labelled row of a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub keys: Vec<String>,
    pub cells: Vec<Option<f64>>,
}

impl ReportRow {
    pub fn key(&self, level: usize) -> &str {
        self.keys.get(level).map(|s| s.as_str()).unwrap_or("")
    }
}

/// A table of optional values with labelled rows
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    index_names: Vec<String>,
    columns: Vec<ColumnKey>,
    rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn new(index_names: Vec<String>, columns: Vec<ColumnKey>) -> Self {
        Self {
            index_names,
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table with one row per series and the union of dates as columns
    pub fn from_series(index_names: Vec<String>, series: Vec<(Vec<String>, DatedSeries)>) -> Self {
        let dates: BTreeSet<NaiveDate> = series.iter().flat_map(|(_, s)| s.keys().copied()).collect();
        let columns: Vec<ColumnKey> = dates.into_iter().map(ColumnKey::Date).collect();

        let rows = series
            .into_iter()
            .map(|(keys, s)| ReportRow {
                keys,
                cells: columns
                    .iter()
                    .map(|c| c.date().and_then(|d| s.get(&d).copied()))
                    .collect(),
            })
            .collect();

        Self {
            index_names,
            columns,
            rows,
        }
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = ReportRow>) {
        self.rows.extend(rows);
    }

    pub fn column_index_of_date(&self, date: NaiveDate) -> Option<usize> {
        self.columns.iter().position(|c| *c == ColumnKey::Date(date))
    }

    /// Row with exactly these keys
    pub fn get(&self, keys: &[&str]) -> Option<&ReportRow> {
        self.rows
            .iter()
            .find(|r| r.keys.len() == keys.len() && r.keys.iter().zip(keys).all(|(a, b)| a == b))
    }

    /// Values of a row as a dated series, skipping missing cells
    pub fn series(&self, keys: &[&str]) -> Option<DatedSeries> {
        let row = self.get(keys)?;
        Some(
            self.columns
                .iter()
                .zip(&row.cells)
                .filter_map(|(c, v)| Some((c.date()?, (*v)?)))
                .collect(),
        )
    }

    /// Keep date columns on or after `start`
    pub fn trim_from(&self, start: NaiveDate) -> ReportTable {
        self.select_columns(|c| c.date().map(|d| d >= start).unwrap_or(true))
    }

    fn select_columns<F: Fn(&ColumnKey) -> bool>(&self, keep: F) -> ReportTable {
        let selected: Vec<usize> = (0..self.columns.len()).filter(|&i| keep(&self.columns[i])).collect();
        ReportTable {
            index_names: self.index_names.clone(),
            columns: selected.iter().map(|&i| self.columns[i]).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| ReportRow {
                    keys: r.keys.clone(),
                    cells: selected.iter().map(|&i| r.cells[i]).collect(),
                })
                .collect(),
        }
    }

    /// Sum monthly date columns into quarters
    ///
    /// A quarter cell is missing unless all three of its months are present.
    pub fn to_quarters(&self) -> ReportTable {
        self.regroup(|d| ColumnKey::Date(quarter_start(d)), Some(3))
    }

    /// Sum date columns by fiscal year, skipping missing cells
    pub fn to_fiscal_years(&self) -> ReportTable {
        self.regroup(|d| ColumnKey::FiscalYear(fiscal_year(d)), None)
    }

    fn regroup<F: Fn(NaiveDate) -> ColumnKey>(&self, key: F, required: Option<usize>) -> ReportTable {
        let mut groups: BTreeMap<ColumnKey, Vec<usize>> = BTreeMap::new();
        for (i, c) in self.columns.iter().enumerate() {
            if let Some(d) = c.date() {
                groups.entry(key(d)).or_default().push(i);
            }
        }

        let columns: Vec<ColumnKey> = groups.keys().copied().collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let cells = groups
                    .values()
                    .map(|members| {
                        let present: Vec<f64> = members.iter().filter_map(|&i| r.cells[i]).collect();
                        let complete = match required {
                            Some(n) => members.len() == n && present.len() == n,
                            None => !present.is_empty(),
                        };
                        if complete {
                            Some(present.iter().sum())
                        } else {
                            None
                        }
                    })
                    .collect();
                ReportRow {
                    keys: r.keys.clone(),
                    cells,
                }
            })
            .collect();

        ReportTable {
            index_names: self.index_names.clone(),
            columns,
            rows,
        }
    }

    /// Keep only the listed fiscal-year columns
    pub fn select_fiscal_years(&self, fiscal_years: &[i32]) -> ReportTable {
        self.select_columns(|c| matches!(c, ColumnKey::FiscalYear(fy) if fiscal_years.contains(fy)))
    }

    /// Multiply every cell by `factor`
    pub fn scaled(&self, factor: f64) -> ReportTable {
        let mut out = self.clone();
        for row in &mut out.rows {
            for cell in row.cells.iter_mut().flatten() {
                *cell *= factor;
            }
        }
        out
    }

    /// Sort rows by their keys with the total rows last
    pub fn sort_with_total_last(&mut self) {
        self.rows.sort_by(|a, b| {
            let a_total = a.key(0) == TOTAL_ROW;
            let b_total = b.key(0) == TOTAL_ROW;
            a_total.cmp(&b_total).then_with(|| a.keys.cmp(&b.keys))
        });
    }

    /// Write the table as CSV with one header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let header: Vec<String> = self
            .index_names
            .iter()
            .cloned()
            .chain(self.columns.iter().map(|c| c.header()))
            .collect();
        csv_writer.write_record(&header)?;

        for row in &self.rows {
            let record: Vec<String> = row
                .keys
                .iter()
                .cloned()
                .chain(row.cells.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()))
                .collect();
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

//! Spreadsheet export of a scenario comparison
//!
//! Sheets, in order:
//!
//! - `<Tax> Forecast` for each tax, with a line chart
//! - `<Scenario> Data` for each scenario, in long format
//! - `Comparison`, `Norm. Comparison` and `Total Shortfalls`, suffixed with
//!   the run frequency (monthly runs also get quarterly versions)
//! - `<Scenario> FY Totals` in thousands of dollars

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use log::info;
use rust_xlsxwriter::{Chart, ChartType, ExcelDateTime, Format, Workbook, Worksheet};

use super::summary::ScenarioComparison;
use super::table::{ColumnKey, ReportTable};
use crate::collections::TaxName;
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::fiscal::Frequency;
use crate::scenario::ScenarioRunner;

/// Longest sheet name Excel accepts
pub const MAX_SHEET_NAME: usize = 31;

const MONEY: &str = "#,##0";
const RATIO: &str = "0.000";
const THOUSANDS: &str = "#,##0.0";

/// Sheet name for a tax's forecast
pub fn tax_sheet_name(tax: TaxName) -> String {
    sheet_name(&format!("{} Forecast", tax.display_name()))
}

/// Clip a name to the sheet name limit
pub fn sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME).collect()
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime> {
    let year = u16::try_from(date.year())
        .map_err(|_| ForecastError::Export(format!("date {} out of range", date)))?;
    Ok(ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)?)
}

struct Formats {
    header: Format,
    date: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            date: Format::new().set_num_format("yyyy-mm-dd"),
        }
    }
}

/// A built workbook and the names of its sheets
pub struct SpreadsheetReport {
    workbook: Workbook,
    sheet_names: Vec<String>,
}

impl SpreadsheetReport {
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.workbook.save(path)?;
        info!("Saved {} sheets to {}", self.sheet_names.len(), path.display());
        Ok(())
    }

    pub fn to_buffer(&mut self) -> Result<Vec<u8>> {
        Ok(self.workbook.save_to_buffer()?)
    }
}

/// Builds the spreadsheet for a set of scenario results
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookExporter {
    /// First date in the comparison sheets
    pub report_start: NaiveDate,
    /// Date from which FY totals use scenario forecasts
    pub scenario_start: NaiveDate,
    pub fiscal_years: Vec<i32>,
}

impl WorkbookExporter {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            report_start: config.report_start,
            scenario_start: config.forecast_start,
            fiscal_years: config.fiscal_years.clone(),
        }
    }

    pub fn build(&self, runner: &ScenarioRunner, comparison: &ScenarioComparison) -> Result<SpreadsheetReport> {
        let mut workbook = Workbook::new();
        let mut sheet_names = Vec::new();
        let formats = Formats::new();

        for forecast in runner.forecasts() {
            let name = tax_sheet_name(forecast.tax());
            self.write_tax_sheet(&mut workbook, &name, forecast.tax(), comparison, &formats)?;
            sheet_names.push(name);
        }

        for scenario in comparison.scenarios() {
            let name = sheet_name(&format!("{} Data", scenario.scenario.title()));
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&name)?;

            for (col, title) in ["date", "tax", "kind", "total"].iter().enumerate() {
                worksheet.write_string_with_format(0, col as u16, *title, &formats.header)?;
            }
            let money = Format::new().set_num_format(MONEY);
            for (i, record) in comparison.tidy_data(scenario.name())?.iter().enumerate() {
                let row = i as u32 + 1;
                worksheet.write_datetime_with_format(row, 0, &excel_date(record.date)?, &formats.date)?;
                worksheet.write_string(row, 1, &record.tax)?;
                worksheet.write_string(row, 2, &record.kind)?;
                if let Some(total) = record.total {
                    worksheet.write_number_with_format(row, 3, total, &money)?;
                }
            }
            worksheet.set_column_width(0, 12)?;
            sheet_names.push(name);
        }

        let mut variants = vec![(comparison.freq(), false)];
        if comparison.freq() == Frequency::Monthly {
            variants.push((Frequency::Quarterly, true));
        }
        for (freq, quarterly) in variants {
            let reports = [
                ("Comparison", comparison.scenario_comparison(self.report_start, quarterly), MONEY),
                ("Norm. Comparison", comparison.normalized_comparison(self.report_start, quarterly), RATIO),
                ("Total Shortfalls", comparison.cumulative_diffs(self.report_start, quarterly), MONEY),
            ];
            for (title, table, number_format) in reports {
                let name = sheet_name(&format!("{} ({})", title, freq.label()));
                write_table(&mut workbook, &name, &table, number_format, &formats)?;
                sheet_names.push(name);
            }
        }

        for scenario in comparison.scenarios() {
            let name = sheet_name(&format!("{} FY Totals", scenario.scenario.title()));
            let totals = comparison
                .fiscal_year_totals(scenario.name(), self.scenario_start, &self.fiscal_years)?
                .scaled(1e-3);
            write_table(&mut workbook, &name, &totals, THOUSANDS, &formats)?;
            sheet_names.push(name);
        }

        Ok(SpreadsheetReport { workbook, sheet_names })
    }

    /// Actual, baseline and scenario revenue for one tax, with a chart
    fn write_tax_sheet(
        &self,
        workbook: &mut Workbook,
        name: &str,
        tax: TaxName,
        comparison: &ScenarioComparison,
        formats: &Formats,
    ) -> Result<()> {
        let outcomes: Vec<_> = comparison
            .scenarios()
            .iter()
            .filter_map(|s| s.get(tax).map(|o| (s, o)))
            .collect();
        let Some((_, first)) = outcomes.first() else {
            return Err(ForecastError::MissingData(format!("no scenario results for {}", tax)));
        };

        let mut columns = vec![
            ("Actual".to_string(), first.actual.clone()),
            ("Baseline".to_string(), first.baseline.clone()),
        ];
        for (scenario, outcome) in &outcomes {
            columns.push((scenario.scenario.title(), outcome.result.total()));
        }
        let dates: BTreeSet<NaiveDate> = columns.iter().flat_map(|(_, s)| s.keys().copied()).collect();

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        worksheet.write_string_with_format(0, 0, "date", &formats.header)?;
        let money = Format::new().set_num_format(MONEY);

        for (c, (title, series)) in columns.iter().enumerate() {
            let col = c as u16 + 1;
            worksheet.write_string_with_format(0, col, title, &formats.header)?;
            for (r, date) in dates.iter().enumerate() {
                if let Some(&value) = series.get(date) {
                    worksheet.write_number_with_format(r as u32 + 1, col, value, &money)?;
                }
            }
        }
        for (r, date) in dates.iter().enumerate() {
            worksheet.write_datetime_with_format(r as u32 + 1, 0, &excel_date(*date)?, &formats.date)?;
        }
        worksheet.set_column_width(0, 12)?;

        if !dates.is_empty() {
            insert_line_chart(worksheet, name, tax, dates.len() as u32, columns.len() as u16)?;
        }
        Ok(())
    }
}

fn insert_line_chart(worksheet: &mut Worksheet, name: &str, tax: TaxName, rows: u32, series: u16) -> Result<()> {
    let mut chart = Chart::new(ChartType::Line);
    chart.title().set_name(format!("{} revenue", tax.display_name()).as_str());
    for col in 1..=series {
        chart
            .add_series()
            .set_name((name, 0, col))
            .set_categories((name, 1, 0, rows, 0))
            .set_values((name, 1, col, rows, col));
    }
    worksheet.insert_chart(1, series + 2, &chart)?;
    Ok(())
}

/// Write a report table with its index labels in the first columns
fn write_table(
    workbook: &mut Workbook,
    name: &str,
    table: &ReportTable,
    number_format: &str,
    formats: &Formats,
) -> Result<()> {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(name)?;
    let numbers = Format::new().set_num_format(number_format);
    let offset = table.index_names().len() as u16;

    for (col, title) in table.index_names().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, title, &formats.header)?;
    }
    for (c, column) in table.columns().iter().enumerate() {
        let col = offset + c as u16;
        match column {
            ColumnKey::Date(date) => {
                worksheet.write_datetime_with_format(0, col, &excel_date(*date)?, &formats.date)?;
            }
            ColumnKey::FiscalYear(_) => {
                worksheet.write_string_with_format(0, col, column.header(), &formats.header)?;
            }
        }
        worksheet.set_column_width(col, 12)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let excel_row = r as u32 + 1;
        for (col, key) in row.keys.iter().enumerate() {
            worksheet.write_string(excel_row, col as u16, key)?;
        }
        for (c, cell) in row.cells.iter().enumerate() {
            if let Some(value) = cell {
                worksheet.write_number_with_format(excel_row, offset + c as u16, *value, &numbers)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_names_fit_excel_limit() {
        for tax in TaxName::ALL {
            assert!(tax_sheet_name(tax).chars().count() <= MAX_SHEET_NAME);
        }
        assert_eq!(tax_sheet_name(TaxName::Rtt), "Realty Transfer Tax Forecast");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), MAX_SHEET_NAME);
    }

    #[test]
    fn test_excel_date() {
        assert!(excel_date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()).is_ok());
    }
}

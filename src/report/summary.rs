//! Comparisons across scenarios

use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::table::{ReportRow, ReportTable};
use crate::error::{ForecastError, Result};
use crate::fiscal::Frequency;
use crate::scenario::ScenarioForecast;

/// One row of the long-format scenario data
#[derive(Debug, Clone, PartialEq)]
pub struct TidyRecord {
    pub date: NaiveDate,
    pub tax: String,
    pub kind: String,
    pub total: Option<f64>,
}

/// Forecasts of several scenarios over the same taxes
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioComparison {
    scenarios: Vec<ScenarioForecast>,
    freq: Frequency,
}

impl ScenarioComparison {
    /// Compare scenario forecasts, ordered by scenario name
    pub fn new(mut scenarios: Vec<ScenarioForecast>, freq: Frequency) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(ForecastError::MissingData("no scenarios to compare".to_string()));
        }
        scenarios.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(Self { scenarios, freq })
    }

    pub fn freq(&self) -> Frequency {
        self.freq
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    pub fn scenarios(&self) -> &[ScenarioForecast] {
        &self.scenarios
    }

    pub fn get(&self, name: &str) -> Result<&ScenarioForecast> {
        self.scenarios
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ForecastError::ScenarioNotRun(name.to_string()))
    }

    /// Summary of one scenario in long format, sorted by date then tax
    pub fn tidy_data(&self, scenario: &str) -> Result<Vec<TidyRecord>> {
        let summary = self.get(scenario)?.summarize();
        let mut out = Vec::new();
        for row in summary.rows() {
            for (column, cell) in summary.columns().iter().zip(&row.cells) {
                if let Some(date) = column.date() {
                    out.push(TidyRecord {
                        date,
                        tax: row.key(0).to_string(),
                        kind: row.key(1).to_string(),
                        total: *cell,
                    });
                }
            }
        }
        // Stable sort keeps actual/baseline/forecast order within a tax
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.tax.cmp(&b.tax)));
        Ok(out)
    }

    /// Build a report from each scenario's summary
    ///
    /// `report` receives the scenario position, its trimmed summary and its
    /// name, and returns the rows to keep.
    fn scenario_report<F>(&self, start: NaiveDate, quarterly: bool, report: F) -> ReportTable
    where
        F: Fn(usize, &ReportTable, &str) -> Vec<ReportRow>,
    {
        let mut out: Option<ReportTable> = None;
        for (i, scenario) in self.scenarios.iter().enumerate() {
            let mut summary = scenario.summarize().trim_from(start);
            if quarterly && self.freq == Frequency::Monthly {
                summary = summary.to_quarters();
            }

            let rows = report(i, &summary, scenario.name());
            match out.as_mut() {
                Some(table) => table.extend(rows),
                None => {
                    let mut table = ReportTable::new(
                        summary.index_names().to_vec(),
                        summary.columns().to_vec(),
                    );
                    table.extend(rows);
                    out = Some(table);
                }
            }
        }

        let mut table = out.unwrap_or_else(|| ReportTable::new(Vec::new(), Vec::new()));
        table.sort_with_total_last();
        table
    }

    /// Actuals (from the first scenario) and each scenario's forecast
    pub fn scenario_comparison(&self, start: NaiveDate, quarterly: bool) -> ReportTable {
        self.scenario_report(start, quarterly, |i, summary, name| {
            summary
                .rows()
                .iter()
                .filter_map(|row| match row.key(1) {
                    "actual" if i == 0 => Some(row.clone()),
                    "forecast" => Some(relabel(row, name)),
                    _ => None,
                })
                .collect()
        })
    }

    /// Actuals and forecasts divided by the baseline
    pub fn normalized_comparison(&self, start: NaiveDate, quarterly: bool) -> ReportTable {
        self.scenario_report(start, quarterly, |i, summary, name| {
            let mut rows = Vec::new();
            for row in summary.rows() {
                let label = match row.key(1) {
                    "actual" if i == 0 => "actual",
                    "forecast" => name,
                    _ => continue,
                };
                let Some(baseline) = summary.get(&[row.key(0), "baseline"]) else {
                    continue;
                };
                let cells = row
                    .cells
                    .iter()
                    .zip(&baseline.cells)
                    .map(|(v, b)| match (v, b) {
                        (Some(v), Some(b)) if *b != 0.0 => Some(v / b),
                        _ => None,
                    })
                    .collect();
                rows.push(ReportRow {
                    keys: vec![row.key(0).to_string(), label.to_string()],
                    cells,
                });
            }
            rows
        })
    }

    /// Running totals of forecast minus baseline
    ///
    /// The first scenario also reports the running total of actual minus
    /// baseline over the dates where every tax has actuals.
    pub fn cumulative_diffs(&self, start: NaiveDate, quarterly: bool) -> ReportTable {
        self.scenario_report(start, quarterly, |i, summary, name| {
            let complete_actuals: Vec<bool> = (0..summary.columns().len())
                .map(|c| {
                    summary
                        .rows()
                        .iter()
                        .filter(|r| r.key(1) == "actual")
                        .all(|r| r.cells[c].is_some())
                })
                .collect();

            let taxes: BTreeSet<&str> = summary.rows().iter().map(|r| r.key(0)).collect();
            let mut rows = Vec::new();
            for tax in taxes {
                let (Some(forecast), Some(baseline)) =
                    (summary.get(&[tax, "forecast"]), summary.get(&[tax, "baseline"]))
                else {
                    continue;
                };
                rows.push(ReportRow {
                    keys: vec![tax.to_string(), name.to_string()],
                    cells: cumulative_diff(&forecast.cells, &baseline.cells, None),
                });

                if i == 0 {
                    if let Some(actual) = summary.get(&[tax, "actual"]) {
                        rows.push(ReportRow {
                            keys: vec![tax.to_string(), "actual".to_string()],
                            cells: cumulative_diff(&actual.cells, &baseline.cells, Some(&complete_actuals)),
                        });
                    }
                }
            }
            rows
        })
    }

    /// Fiscal-year totals: actuals before `scenario_start`, then the scenario
    ///
    /// Actuals are used only on dates where every tax has them. Columns are
    /// limited to `fiscal_years` when it is not empty.
    pub fn fiscal_year_totals(
        &self,
        scenario: &str,
        scenario_start: NaiveDate,
        fiscal_years: &[i32],
    ) -> Result<ReportTable> {
        let summary = self.get(scenario)?.summarize();
        let taxes: BTreeSet<&str> = summary.rows().iter().map(|r| r.key(0)).collect();

        let complete_actuals: Vec<bool> = (0..summary.columns().len())
            .map(|c| {
                summary
                    .rows()
                    .iter()
                    .filter(|r| r.key(1) == "actual")
                    .all(|r| r.cells[c].is_some())
            })
            .collect();

        let mut combined = ReportTable::new(vec!["tax".to_string()], summary.columns().to_vec());
        for tax in taxes {
            let actual = summary.get(&[tax, "actual"]);
            let forecast = summary.get(&[tax, "forecast"]);
            let cells = summary
                .columns()
                .iter()
                .enumerate()
                .map(|(c, column)| {
                    let date = column.date()?;
                    if date < scenario_start {
                        if complete_actuals[c] {
                            actual.and_then(|r| r.cells[c])
                        } else {
                            None
                        }
                    } else {
                        forecast.and_then(|r| r.cells[c])
                    }
                })
                .collect();
            combined.push(ReportRow {
                keys: vec![tax.to_string()],
                cells,
            });
        }

        let mut totals = combined.to_fiscal_years();
        if !fiscal_years.is_empty() {
            totals = totals.select_fiscal_years(fiscal_years);
        }
        totals.sort_with_total_last();
        Ok(totals)
    }
}

fn relabel(row: &ReportRow, label: &str) -> ReportRow {
    ReportRow {
        keys: vec![row.key(0).to_string(), label.to_string()],
        cells: row.cells.clone(),
    }
}

/// Running sum of `values - baseline`; missing differences stay missing
fn cumulative_diff(values: &[Option<f64>], baseline: &[Option<f64>], mask: Option<&[bool]>) -> Vec<Option<f64>> {
    let mut running = 0.0;
    values
        .iter()
        .zip(baseline)
        .enumerate()
        .map(|(i, (v, b))| {
            if mask.map(|m| !m[i]).unwrap_or(false) {
                return None;
            }
            match (v, b) {
                (Some(v), Some(b)) => {
                    running += v - b;
                    Some(running)
                }
                _ => None,
            }
        })
        .collect()
}

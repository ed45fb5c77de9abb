//! Scenario runner for batch forecasts
//!
//! Fits every tax baseline once, then runs any number of scenarios over the
//! same baselines without refitting.

use std::collections::BTreeMap;

use log::info;

use super::forecast::{ForecastResult, RevenueForecast};
use super::Scenario;
use crate::collections::{DataSource, TaxName};
use crate::error::{ForecastError, Result};
use crate::fiscal::Frequency;
use crate::frame::DatedSeries;
use crate::report::{ReportRow, ReportTable, ScenarioComparison, TOTAL_ROW};
use crate::taxes::TaxDefinition;

/// Row kinds in a scenario summary
pub const SUMMARY_KINDS: [&str; 3] = ["actual", "baseline", "forecast"];

/// Results of one tax under one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct TaxOutcome {
    pub actual: DatedSeries,
    pub baseline: DatedSeries,
    pub result: ForecastResult,
}

impl TaxOutcome {
    fn series(&self, kind: &str) -> DatedSeries {
        match kind {
            "actual" => self.actual.clone(),
            "baseline" => self.baseline.clone(),
            _ => self.result.total(),
        }
    }
}

/// All tax forecasts for a single scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioForecast {
    pub scenario: Scenario,
    outcomes: BTreeMap<TaxName, TaxOutcome>,
}

impl ScenarioForecast {
    pub fn new(scenario: Scenario, outcomes: BTreeMap<TaxName, TaxOutcome>) -> Self {
        Self { scenario, outcomes }
    }

    pub fn name(&self) -> &str {
        &self.scenario.name
    }

    /// Taxes in alphabetical order
    pub fn taxes(&self) -> Vec<TaxName> {
        self.outcomes.keys().copied().collect()
    }

    pub fn get(&self, tax: TaxName) -> Option<&TaxOutcome> {
        self.outcomes.get(&tax)
    }

    /// Actual, baseline and forecast totals for each tax plus a total row
    ///
    /// Rows are keyed by (tax, kind) and columns are dates. A total that
    /// sums to zero is reported as missing.
    pub fn summarize(&self) -> ReportTable {
        let mut series: Vec<(Vec<String>, DatedSeries)> = Vec::new();
        for (tax, outcome) in &self.outcomes {
            for kind in SUMMARY_KINDS {
                series.push((vec![tax.to_string(), kind.to_string()], outcome.series(kind)));
            }
        }

        let mut table = ReportTable::from_series(vec!["tax".to_string(), "kind".to_string()], series);

        for kind in SUMMARY_KINDS {
            let mut cells = vec![0.0; table.columns().len()];
            for row in table.rows().iter().filter(|r| r.keys[1] == kind) {
                for (acc, cell) in cells.iter_mut().zip(&row.cells) {
                    *acc += cell.unwrap_or(0.0);
                }
            }
            let cells = cells
                .into_iter()
                .map(|v| if v == 0.0 { None } else { Some(v) })
                .collect();
            table.push(ReportRow {
                keys: vec![TOTAL_ROW.to_string(), kind.to_string()],
                cells,
            });
        }
        table
    }
}

/// Pre-fitted baselines ready to run scenarios
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    forecasts: BTreeMap<TaxName, RevenueForecast>,
    scenarios: Vec<Scenario>,
}

impl ScenarioRunner {
    /// Create a runner from forecasts that are already fit
    pub fn new(forecasts: Vec<RevenueForecast>, scenarios: Vec<Scenario>) -> Self {
        Self {
            forecasts: forecasts.into_iter().map(|f| (f.tax(), f)).collect(),
            scenarios,
        }
    }

    /// Fit the baseline of every defined tax
    pub fn fit(definitions: &[TaxDefinition], scenarios: Vec<Scenario>, data: &dyn DataSource) -> Result<Self> {
        let mut forecasts = Vec::with_capacity(definitions.len());
        for definition in definitions {
            info!("Preparing {} forecast", definition.tax());
            forecasts.push(definition.build(data)?);
        }
        Ok(Self::new(forecasts, scenarios))
    }

    pub fn forecasts(&self) -> impl Iterator<Item = &RevenueForecast> {
        self.forecasts.values()
    }

    pub fn get(&self, tax: TaxName) -> Option<&RevenueForecast> {
        self.forecasts.get(&tax)
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Run a single scenario over every tax
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioForecast> {
        if self.forecasts.is_empty() {
            return Err(ForecastError::MissingData("no taxes to forecast".to_string()));
        }

        let mut outcomes = BTreeMap::new();
        for (tax, forecast) in &self.forecasts {
            let result = forecast.run_forecast(&scenario.name)?;
            outcomes.insert(
                *tax,
                TaxOutcome {
                    actual: forecast.total_actuals(),
                    baseline: forecast.total_baseline(),
                    result,
                },
            );
        }
        Ok(ScenarioForecast::new(scenario.clone(), outcomes))
    }

    /// Run every configured scenario
    pub fn run_all(&self) -> Result<ScenarioComparison> {
        let mut forecasts = Vec::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            info!("Running {} scenario", scenario.name);
            forecasts.push(self.run(scenario)?);
        }
        let freq = self
            .forecasts
            .values()
            .next()
            .map(|f| f.baseline().freq())
            .unwrap_or(Frequency::Quarterly);
        ScenarioComparison::new(forecasts, freq)
    }
}

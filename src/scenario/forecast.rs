//! Scenario forecasts derived from a fitted baseline

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info};

use super::adjustment::{Adjustment, Period};
use crate::baseline::{BaselineForecast, Component};
use crate::collections::TaxName;
use crate::error::{ForecastError, Result};
use crate::fiscal::{period_range, Frequency};
use crate::frame::{DatedSeries, SectorFrame};

/// Dates over which scenario adjustments apply
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastWindow {
    start: NaiveDate,
    stop: NaiveDate,
    dates: Vec<NaiveDate>,
}

impl ForecastWindow {
    pub fn new(start: NaiveDate, stop: NaiveDate, freq: Frequency) -> Self {
        Self {
            start,
            stop,
            dates: period_range(start, stop, freq),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn stop(&self) -> NaiveDate {
        self.stop
    }

    /// Period starts inside the window
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.stop
    }

    /// Locate a date in the window
    ///
    /// Dates between period starts map to the previous period.
    pub fn period(&self, date: NaiveDate) -> Result<Period> {
        if date < self.start {
            return Err(ForecastError::BeforeForecastStart { date, start: self.start });
        }
        if date > self.stop {
            return Err(ForecastError::AfterForecastStop { date, stop: self.stop });
        }

        let after = self.dates.partition_point(|d| *d <= date);
        if after == 0 {
            return Err(ForecastError::BeforeForecastStart { date, start: self.start });
        }
        Ok(Period {
            date,
            index: after - 1,
            count: self.dates.len(),
        })
    }
}

/// Projected revenue for one tax under one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub tax: TaxName,
    pub scenario: String,
    /// Revenue per sector, trimmed at the end of the forecast window
    pub values: SectorFrame,
}

impl ForecastResult {
    /// Revenue summed over sectors
    pub fn total(&self) -> DatedSeries {
        self.values.total()
    }
}

/// A tax's baseline plus its scenario assumptions
#[derive(Debug, Clone)]
pub struct RevenueForecast {
    baseline: BaselineForecast,
    window: ForecastWindow,
    assumptions: BTreeMap<String, Adjustment>,
}

impl RevenueForecast {
    pub fn new(
        baseline: BaselineForecast,
        forecast_start: NaiveDate,
        forecast_stop: NaiveDate,
        assumptions: BTreeMap<String, Adjustment>,
    ) -> Self {
        let window = ForecastWindow::new(forecast_start, forecast_stop, baseline.freq());
        Self {
            baseline,
            window,
            assumptions,
        }
    }

    pub fn tax(&self) -> TaxName {
        self.baseline.tax()
    }

    pub fn baseline(&self) -> &BaselineForecast {
        &self.baseline
    }

    pub fn window(&self) -> &ForecastWindow {
        &self.window
    }

    pub fn has_sectors(&self) -> bool {
        self.baseline.has_sectors()
    }

    /// Scenarios with assumptions for this tax
    pub fn scenarios(&self) -> Vec<&str> {
        self.assumptions.keys().map(|s| s.as_str()).collect()
    }

    pub fn adjustment(&self, scenario: &str) -> Result<&Adjustment> {
        self.assumptions
            .get(scenario)
            .ok_or_else(|| ForecastError::UnknownScenario {
                tax: self.tax().to_string(),
                scenario: scenario.to_string(),
            })
    }

    /// Baseline revenue summed over sectors, up to the end of the window
    pub fn total_baseline(&self) -> DatedSeries {
        self.baseline
            .forecasted_total_revenue()
            .range(..=self.window.stop())
            .map(|(&d, &v)| (d, v))
            .collect()
    }

    /// Actual revenue summed over sectors
    pub fn total_actuals(&self) -> DatedSeries {
        self.baseline.actual_total_revenue()
    }

    /// Adjusted revenue for one date, per sector
    pub fn forecast_value(
        &self,
        date: NaiveDate,
        baseline: &BTreeMap<String, f64>,
        scenario: &str,
    ) -> Result<BTreeMap<String, f64>> {
        let adjustment = self.adjustment(scenario)?;
        let period = self.window.period(date)?;
        adjustment.apply(period, baseline)
    }

    /// Apply a scenario to the baseline
    ///
    /// Starts from a copy of the baseline revenue and replaces only the
    /// periods inside the forecast window; earlier values are untouched.
    pub fn run_forecast(&self, scenario: &str) -> Result<ForecastResult> {
        // Fail early on unknown scenarios even if the window is empty
        self.adjustment(scenario)?;

        let baseline = self.baseline.forecasted_revenue_frame(Component::Total);
        let mut values = baseline.clone();

        let mut adjusted = 0usize;
        for date in baseline.dates() {
            if !self.window.contains(date) {
                continue;
            }
            let row = baseline.row(date);
            for (sector, value) in self.forecast_value(date, &row, scenario)? {
                values.insert(&sector, date, value);
            }
            adjusted += 1;
        }

        debug!("{} {}: adjusted {} periods", self.tax(), scenario, adjusted);
        info!("Ran {} forecast for {}", scenario, self.tax());

        Ok(ForecastResult {
            tax: self.tax(),
            scenario: scenario.to_string(),
            values: values.until(self.window.stop()),
        })
    }
}

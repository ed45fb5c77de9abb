//! Baseline revenue forecast for one tax
//!
//! The pipeline runs once per tax:
//!
//! 1. split monthly collections by sector (or keep a single total column)
//! 2. aggregate to quarters when fitting quarterly
//! 3. convert revenue to tax base
//! 4. fit one model per column and predict to the horizon (cached)
//! 5. convert predictions back to revenue

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::cache::{BaselineCache, CacheKey};
use super::model::{AdditiveModel, FitOptions, ForecastPoint, SectorPredictions};
use super::transform::{
    aggregate, apply_crosswalk, disaggregate_by_sector, reshape_raw_actuals, to_tax_base,
};
use crate::collections::{DataSource, TaxName, TaxRates};
use crate::error::{ForecastError, Result};
use crate::fiscal::{fiscal_year, period_range, Frequency};
use crate::frame::{DatedSeries, SectorFrame};

/// Default end of the baseline prediction
pub fn default_horizon() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or(NaiveDate::MAX)
}

/// Component of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Total,
    Lower,
    Upper,
    Trend,
    Yearly,
}

impl Component {
    pub fn of(&self, point: &ForecastPoint) -> f64 {
        match self {
            Component::Total => point.total,
            Component::Lower => point.lower,
            Component::Upper => point.upper,
            Component::Trend => point.trend,
            Component::Yearly => point.yearly,
        }
    }
}

/// Settings for fitting one baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub tax: TaxName,
    pub freq: Frequency,
    pub fit_start: NaiveDate,
    pub fit_stop: NaiveDate,
    pub horizon: NaiveDate,
    /// Fit the total even when sector data exists
    pub ignore_sectors: bool,
    /// Disaggregate by subsectors instead of parent sectors
    pub use_subsectors: bool,
    /// Refit even if a cached baseline exists
    pub fresh: bool,
    pub fit_options: FitOptions,
    pub sector_crosswalk: Option<BTreeMap<String, Vec<String>>>,
    pub cache_dir: Option<PathBuf>,
}

impl BaselineConfig {
    pub fn new(tax: TaxName, freq: Frequency) -> Self {
        Self {
            tax,
            freq,
            fit_start: NaiveDate::from_ymd_opt(2014, 7, 1).unwrap_or(NaiveDate::MIN),
            fit_stop: NaiveDate::from_ymd_opt(2020, 3, 31).unwrap_or(NaiveDate::MAX),
            horizon: default_horizon(),
            ignore_sectors: false,
            use_subsectors: false,
            fresh: false,
            fit_options: FitOptions::default(),
            sector_crosswalk: None,
            cache_dir: None,
        }
    }

    /// Whether the baseline is fit per sector
    pub fn has_sectors(&self) -> bool {
        self.tax.has_sector_data() && !self.ignore_sectors
    }

    fn cache_key(&self) -> CacheKey<'_> {
        CacheKey {
            use_subsectors: self.use_subsectors,
            ignore_sectors: self.ignore_sectors,
            freq: self.freq,
            fit_start: self.fit_start,
            fit_stop: self.fit_stop,
            horizon: self.horizon,
            fit_options: &self.fit_options,
            crosswalk: self.sector_crosswalk.as_ref(),
        }
    }
}

/// A fitted baseline forecast
///
/// Immutable once fit; scenario forecasts derive new values from it.
#[derive(Debug, Clone)]
pub struct BaselineForecast {
    config: BaselineConfig,
    rates: Option<TaxRates>,
    actual_revenue: SectorFrame,
    tax_base_predictions: SectorPredictions,
    revenue_predictions: SectorPredictions,
}

impl BaselineForecast {
    /// Run the full pipeline for one tax
    pub fn fit(config: BaselineConfig, data: &dyn DataSource) -> Result<Self> {
        let tax = config.tax;
        let collections = data.monthly_collections(tax)?;

        let frame = if config.has_sectors() {
            let sectors = data.sector_collections(tax, config.use_subsectors)?;
            let split = disaggregate_by_sector(collections.monthly(), &sectors);
            apply_crosswalk(split, config.sector_crosswalk.as_ref())
        } else {
            reshape_raw_actuals(collections.monthly())
        };
        let actual_revenue = aggregate(&frame, config.freq);

        let rates = data.tax_rates(tax)?;
        if let Some(rates) = &rates {
            let last = rates.last_fiscal_year();
            if fiscal_year(config.horizon) > last {
                warn!("{} rates end in FY{}; later years use the FY{} rate", tax, last, last);
            }
        }

        let tax_base = to_tax_base(&actual_revenue, rates.as_ref());
        let tax_base_predictions = Self::fit_tax_base(&config, &tax_base)?;
        let revenue_predictions = convert_predictions(&tax_base_predictions, rates.as_ref());

        let forecast = Self {
            config,
            rates,
            actual_revenue,
            tax_base_predictions,
            revenue_predictions,
        };

        debug!(
            "{} baseline: MAE {:.0}, MAPE {:.4}, RMS {:.0}",
            tax,
            forecast.mean_abs_error(),
            forecast.mean_abs_percent_error(),
            forecast.mean_rms()
        );
        Ok(forecast)
    }

    /// Fit every column of the tax base, or reuse a cached fit
    fn fit_tax_base(config: &BaselineConfig, tax_base: &SectorFrame) -> Result<SectorPredictions> {
        let cache = config.cache_dir.as_ref().map(BaselineCache::new);
        let id = config.cache_key().identifier()?;

        if let Some(cache) = &cache {
            if !config.fresh {
                if let Some(cached) = cache.load(config.tax, &id)? {
                    info!("Using cached {} baseline {}", config.tax, id);
                    return Ok(cached);
                }
            }
        }

        info!("Fitting {} baseline ({} columns)", config.tax, tax_base.sectors().len());
        let mut out = SectorPredictions::new();
        for (index, (sector, column)) in tax_base.columns().enumerate() {
            let history: DatedSeries = column
                .range(config.fit_start..=config.fit_stop)
                .map(|(&d, &v)| (d, v))
                .collect();
            let Some(&first) = history.keys().next() else {
                return Err(ForecastError::MissingData(format!(
                    "{} sector '{}' has no data between {} and {}",
                    config.tax, sector, config.fit_start, config.fit_stop
                )));
            };

            let options = FitOptions {
                seed: config.fit_options.seed.wrapping_add(index as u64),
                ..config.fit_options.clone()
            };
            let fitted = AdditiveModel::new(options, config.freq)
                .fit(&history)
                .map_err(|e| match e {
                    ForecastError::Fit(msg) => {
                        ForecastError::Fit(format!("{} sector '{}': {}", config.tax, sector, msg))
                    }
                    other => other,
                })?;

            let dates = period_range(first, config.horizon, config.freq);
            out.insert(sector.clone(), fitted.predict(&dates));
        }

        if let Some(cache) = &cache {
            cache.store(config.tax, &id, &out)?;
        }
        Ok(out)
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    pub fn tax(&self) -> TaxName {
        self.config.tax
    }

    pub fn freq(&self) -> Frequency {
        self.config.freq
    }

    pub fn rates(&self) -> Option<&TaxRates> {
        self.rates.as_ref()
    }

    pub fn has_sectors(&self) -> bool {
        self.config.has_sectors()
    }

    /// Sectors fit, or empty for single-series taxes
    pub fn sectors(&self) -> Vec<String> {
        if self.has_sectors() {
            self.revenue_predictions.keys().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Processed actual revenue per sector
    pub fn actual_revenue(&self) -> &SectorFrame {
        &self.actual_revenue
    }

    pub fn actual_tax_base(&self) -> SectorFrame {
        to_tax_base(&self.actual_revenue, self.rates.as_ref())
    }

    pub fn actual_total_revenue(&self) -> DatedSeries {
        self.actual_revenue.total()
    }

    pub fn actual_total_tax_base(&self) -> DatedSeries {
        self.actual_tax_base().total()
    }

    /// Predicted revenue with all components, per sector
    pub fn forecasted_revenue(&self) -> &SectorPredictions {
        &self.revenue_predictions
    }

    /// Predicted tax base with all components, per sector
    pub fn forecasted_tax_base(&self) -> &SectorPredictions {
        &self.tax_base_predictions
    }

    /// One component of the revenue prediction as a frame
    pub fn forecasted_revenue_frame(&self, component: Component) -> SectorFrame {
        component_frame(&self.revenue_predictions, component)
    }

    pub fn forecasted_tax_base_frame(&self, component: Component) -> SectorFrame {
        component_frame(&self.tax_base_predictions, component)
    }

    /// Predicted revenue summed over sectors
    pub fn forecasted_total_revenue(&self) -> DatedSeries {
        self.forecasted_revenue_frame(Component::Total).total()
    }

    pub fn forecasted_total_tax_base(&self) -> DatedSeries {
        self.forecasted_tax_base_frame(Component::Total).total()
    }

    /// Pairs of (actual, predicted) total revenue inside the fit window
    fn fit_residuals(&self) -> Vec<(f64, f64)> {
        let actual = self.actual_total_revenue();
        let predicted = self.forecasted_total_revenue();
        actual
            .range(self.config.fit_start..=self.config.fit_stop)
            .filter_map(|(date, &h)| predicted.get(date).map(|&p| (h, p)))
            .collect()
    }

    pub fn mean_abs_error(&self) -> f64 {
        mean(self.fit_residuals().iter().map(|(h, p)| (h - p).abs()))
    }

    pub fn mean_abs_percent_error(&self) -> f64 {
        mean(
            self.fit_residuals()
                .iter()
                .filter(|(h, _)| *h != 0.0)
                .map(|(h, p)| ((h - p) / h).abs()),
        )
    }

    pub fn mean_rms(&self) -> f64 {
        mean(self.fit_residuals().iter().map(|(h, p)| (h - p).powi(2))).sqrt()
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn component_frame(predictions: &SectorPredictions, component: Component) -> SectorFrame {
    let mut frame = SectorFrame::new();
    for (sector, points) in predictions {
        frame.insert_column(sector, points.iter().map(|p| (p.date, component.of(p))).collect());
    }
    frame
}

fn convert_predictions(predictions: &SectorPredictions, rates: Option<&TaxRates>) -> SectorPredictions {
    match rates {
        None => predictions.clone(),
        Some(rates) => predictions
            .iter()
            .map(|(sector, points)| {
                let scaled = points
                    .iter()
                    .map(|p| p.scaled(rates.rate_for(fiscal_year(p.date))))
                    .collect();
                (sector.clone(), scaled)
            })
            .collect(),
    }
}

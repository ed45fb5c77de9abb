//! Additive decomposition model for baseline forecasts
//!
//! The model decomposes a series into a piecewise-linear trend and a yearly
//! Fourier seasonality:
//!
//! ```text
//! additive:        y(t) = g(t) + s(t)
//! multiplicative:  y(t) = g(t) * (1 + s(t))
//! g(t) = m + k t + sum_j delta_j (t - c_j)+
//! ```
//!
//! Coefficients are the MAP estimate under Gaussian priors, i.e. ridge
//! regression with one penalty per coefficient group, on time scaled to [0, 1]
//! over the fit window and values scaled by their max absolute value.
//! Uncertainty intervals come from simulating future trend changes and
//! residual noise with a seeded RNG, so a fixed seed gives identical output.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::fiscal::{decimal_year, Frequency};
use crate::frame::DatedSeries;

/// Minimum number of observations needed to fit
pub const MIN_FIT_OBSERVATIONS: usize = 4;

/// How seasonality combines with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

/// Fitting options for the decomposition model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub seasonality_mode: SeasonalityMode,
    /// Constant trend instead of piecewise-linear growth
    pub flat_growth: bool,
    /// Number of potential changepoints; defaults to min(0.7 n, 25)
    pub n_changepoints: Option<usize>,
    /// Share of the history in which changepoints may fall
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    /// Fourier order of the yearly term, capped at half the periods per year
    pub yearly_order: usize,
    /// Width of the uncertainty interval
    pub interval_width: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Additive,
            flat_growth: false,
            n_changepoints: None,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_order: 10,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            seed: 42,
        }
    }
}

impl FitOptions {
    pub fn additive() -> Self {
        Self::default()
    }

    pub fn multiplicative() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..Self::default()
        }
    }

    pub fn with_flat_growth(mut self, flat: bool) -> Self {
        self.flat_growth = flat;
        self
    }
}

/// Predicted components per sector, in date order
pub type SectorPredictions = BTreeMap<String, Vec<ForecastPoint>>;

/// Predicted components for one period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub total: f64,
    pub lower: f64,
    pub upper: f64,
    pub trend: f64,
    /// Yearly seasonal contribution in the units of `total`
    pub yearly: f64,
}

impl ForecastPoint {
    /// Multiply every component by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let (lower, upper) = if factor >= 0.0 {
            (self.lower * factor, self.upper * factor)
        } else {
            (self.upper * factor, self.lower * factor)
        };
        Self {
            date: self.date,
            total: self.total * factor,
            lower,
            upper,
            trend: self.trend * factor,
            yearly: self.yearly * factor,
        }
    }
}

/// Unfitted decomposition model
#[derive(Debug, Clone)]
pub struct AdditiveModel {
    options: FitOptions,
    freq: Frequency,
}

impl AdditiveModel {
    pub fn new(options: FitOptions, freq: Frequency) -> Self {
        Self { options, freq }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Fit the model to a dated history
    pub fn fit(&self, history: &DatedSeries) -> Result<FittedModel> {
        let n = history.len();
        if n < MIN_FIT_OBSERVATIONS {
            return Err(ForecastError::Fit(format!(
                "need at least {} observations, got {}",
                MIN_FIT_OBSERVATIONS, n
            )));
        }
        if history.values().any(|v| !v.is_finite()) {
            return Err(ForecastError::Fit("history contains non-finite values".to_string()));
        }

        let dates: Vec<NaiveDate> = history.keys().copied().collect();
        let t_start = decimal_year(dates[0]);
        let t_span = decimal_year(dates[n - 1]) - t_start;
        if t_span <= 0.0 {
            return Err(ForecastError::Fit("history spans no time".to_string()));
        }

        let y_scale = history
            .values()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            .max(f64::EPSILON);
        let ys: Vec<f64> = history.values().map(|v| v / y_scale).collect();
        let ts: Vec<f64> = dates.iter().map(|d| (decimal_year(*d) - t_start) / t_span).collect();
        let years: Vec<f64> = dates.iter().map(|d| decimal_year(*d)).collect();

        let changepoints = if self.options.flat_growth {
            Vec::new()
        } else {
            place_changepoints(&ts, &self.options)
        };
        let order = self.options.yearly_order.min(self.freq.periods_per_year() / 2);

        let layout = Layout {
            flat: self.options.flat_growth,
            n_changepoints: changepoints.len(),
            order,
        };

        // Noise scale from a fit without changepoints sets the prior strength
        let rough_layout = Layout { n_changepoints: 0, ..layout };
        let rough = solve_ridge(
            &design(&ts, &years, &[], rough_layout, None),
            &ys,
            &vec![1e-6; rough_layout.width()],
        )?;
        let rough_sigma2 = residual_variance(&design(&ts, &years, &[], rough_layout, None), &ys, &rough)
            .max(1e-8);

        let penalties = layout.penalties(rough_sigma2, &self.options);
        let mut beta = solve_ridge(&design(&ts, &years, &changepoints, layout, None), &ys, &penalties)?;

        if self.options.seasonality_mode == SeasonalityMode::Multiplicative {
            for _ in 0..20 {
                let trend: Vec<f64> = ts
                    .iter()
                    .map(|&t| layout.trend(&beta, &changepoints, t))
                    .collect();
                let next = solve_ridge(
                    &design(&ts, &years, &changepoints, layout, Some(&trend)),
                    &ys,
                    &penalties,
                )?;
                let shift = (&next - &beta).amax();
                beta = next;
                if shift < 1e-10 {
                    break;
                }
            }
        }

        let fitted = FittedModel {
            options: self.options.clone(),
            t_start,
            t_span,
            y_scale,
            changepoints,
            layout,
            beta: beta.iter().copied().collect(),
            sigma: 0.0,
            history_end: dates[n - 1],
        };

        let sigma = {
            let sse: f64 = dates
                .iter()
                .zip(&ys)
                .map(|(d, y)| {
                    let (total, _, _) = fitted.components_scaled(fitted.scaled_time(*d), decimal_year(*d));
                    (y - total).powi(2)
                })
                .sum();
            (sse / n as f64).sqrt()
        };

        debug!(
            "Fitted {} observations: {} changepoints, order {}, sigma {:.4}",
            n,
            fitted.changepoints.len(),
            order,
            sigma
        );

        Ok(FittedModel { sigma, ..fitted })
    }
}

/// Column layout of the design matrix
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    flat: bool,
    n_changepoints: usize,
    order: usize,
}

impl Layout {
    fn slope_cols(&self) -> usize {
        if self.flat {
            0
        } else {
            1
        }
    }

    fn seasonal_offset(&self) -> usize {
        1 + self.slope_cols() + self.n_changepoints
    }

    fn width(&self) -> usize {
        self.seasonal_offset() + 2 * self.order
    }

    /// Ridge penalties equal to sigma^2 / prior_scale^2 per coefficient
    fn penalties(&self, sigma2: f64, options: &FitOptions) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width());
        out.push(sigma2 / 25.0);
        if !self.flat {
            out.push(sigma2 / 25.0);
        }
        let cp = sigma2 / options.changepoint_prior_scale.powi(2);
        out.extend(std::iter::repeat(cp).take(self.n_changepoints));
        let seasonal = sigma2 / options.seasonality_prior_scale.powi(2);
        out.extend(std::iter::repeat(seasonal).take(2 * self.order));
        out
    }

    fn trend(&self, beta: &DVector<f64>, changepoints: &[f64], t: f64) -> f64 {
        trend_value(beta.as_slice(), self, changepoints, &[], t)
    }
}

fn trend_value(beta: &[f64], layout: &Layout, changepoints: &[f64], extra: &[(f64, f64)], t: f64) -> f64 {
    let mut g = beta[0];
    if !layout.flat {
        g += beta[1] * t;
        for (j, c) in changepoints.iter().enumerate() {
            g += beta[2 + j] * (t - c).max(0.0);
        }
        for (c, delta) in extra {
            g += delta * (t - c).max(0.0);
        }
    }
    g
}

fn fourier(year: f64, order: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * order);
    for k in 1..=order {
        let angle = 2.0 * std::f64::consts::PI * k as f64 * year;
        out.push(angle.sin());
        out.push(angle.cos());
    }
    out
}

fn design(
    ts: &[f64],
    years: &[f64],
    changepoints: &[f64],
    layout: Layout,
    seasonal_weight: Option<&[f64]>,
) -> DMatrix<f64> {
    let mut x = DMatrix::zeros(ts.len(), layout.width());
    for (i, (&t, &year)) in ts.iter().zip(years).enumerate() {
        x[(i, 0)] = 1.0;
        if !layout.flat {
            x[(i, 1)] = t;
            for (j, c) in changepoints.iter().enumerate() {
                x[(i, 2 + j)] = (t - c).max(0.0);
            }
        }
        let weight = seasonal_weight.map(|w| w[i]).unwrap_or(1.0);
        for (j, f) in fourier(year, layout.order).into_iter().enumerate() {
            x[(i, layout.seasonal_offset() + j)] = f * weight;
        }
    }
    x
}

fn solve_ridge(x: &DMatrix<f64>, ys: &[f64], penalties: &[f64]) -> Result<DVector<f64>> {
    let y = DVector::from_column_slice(ys);
    let xt = x.transpose();
    let mut a = &xt * x;
    for (j, p) in penalties.iter().enumerate() {
        a[(j, j)] += p;
    }
    let b = &xt * y;

    if let Some(chol) = a.clone().cholesky() {
        return Ok(chol.solve(&b));
    }

    // Retry with a small diagonal jitter for rank-deficient designs
    for j in 0..a.nrows() {
        a[(j, j)] += 1e-9;
    }
    a.cholesky()
        .map(|chol| chol.solve(&b))
        .ok_or_else(|| ForecastError::Fit("normal equations are not positive definite".to_string()))
}

fn residual_variance(x: &DMatrix<f64>, ys: &[f64], beta: &DVector<f64>) -> f64 {
    let fitted = x * beta;
    let sse: f64 = fitted.iter().zip(ys).map(|(f, y)| (y - f).powi(2)).sum();
    sse / ys.len() as f64
}

/// Evenly spaced changepoints over the first part of the history
fn place_changepoints(ts: &[f64], options: &FitOptions) -> Vec<f64> {
    let n = ts.len();
    let hist_size = ((n as f64) * options.changepoint_range).floor() as usize;
    let requested = options
        .n_changepoints
        .unwrap_or_else(|| ((0.7 * n as f64) as usize).min(25));
    let count = requested.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    let mut out: Vec<f64> = (1..=count)
        .map(|i| {
            let idx = (last * i as f64 / count as f64).round() as usize;
            ts[idx]
        })
        .collect();
    out.dedup();
    out
}

/// A fitted decomposition model
#[derive(Debug, Clone)]
pub struct FittedModel {
    options: FitOptions,
    t_start: f64,
    t_span: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    layout: Layout,
    beta: Vec<f64>,
    sigma: f64,
    history_end: NaiveDate,
}

impl FittedModel {
    /// Residual standard deviation in data units
    pub fn sigma(&self) -> f64 {
        self.sigma * self.y_scale
    }

    pub fn changepoint_count(&self) -> usize {
        self.changepoints.len()
    }

    pub fn history_end(&self) -> NaiveDate {
        self.history_end
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (decimal_year(date) - self.t_start) / self.t_span
    }

    /// (total, trend, seasonal) on the scaled axis
    fn components_scaled(&self, t: f64, year: f64) -> (f64, f64, f64) {
        self.components_with(t, year, &[])
    }

    fn components_with(&self, t: f64, year: f64, extra: &[(f64, f64)]) -> (f64, f64, f64) {
        let g = trend_value(&self.beta, &self.layout, &self.changepoints, extra, t);
        let offset = self.layout.seasonal_offset();
        let s: f64 = fourier(year, self.layout.order)
            .iter()
            .zip(&self.beta[offset..])
            .map(|(f, b)| f * b)
            .sum();

        match self.options.seasonality_mode {
            SeasonalityMode::Additive => (g + s, g, s),
            SeasonalityMode::Multiplicative => (g * (1.0 + s), g, g * s),
        }
    }

    /// Predict every date in `dates`, with uncertainty intervals
    pub fn predict(&self, dates: &[NaiveDate]) -> Vec<ForecastPoint> {
        let bands = self.simulate_bands(dates);

        dates
            .iter()
            .zip(bands)
            .map(|(date, (lower, upper))| {
                let (total, trend, yearly) =
                    self.components_scaled(self.scaled_time(*date), decimal_year(*date));
                ForecastPoint {
                    date: *date,
                    total: total * self.y_scale,
                    lower: lower * self.y_scale,
                    upper: upper * self.y_scale,
                    trend: trend * self.y_scale,
                    yearly: yearly * self.y_scale,
                }
            })
            .collect()
    }

    /// Lower and upper quantiles of simulated predictions (scaled units)
    fn simulate_bands(&self, dates: &[NaiveDate]) -> Vec<(f64, f64)> {
        let samples = self.options.uncertainty_samples;
        let coords: Vec<(f64, f64)> = dates
            .iter()
            .map(|d| (self.scaled_time(*d), decimal_year(*d)))
            .collect();

        if samples == 0 {
            return coords
                .iter()
                .map(|&(t, y)| {
                    let (total, _, _) = self.components_scaled(t, y);
                    (total, total)
                })
                .collect();
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let noise = Normal::new(0.0, self.sigma).ok();
        let t_max = coords.iter().map(|(t, _)| *t).fold(1.0_f64, f64::max);
        let delta_scale = if self.changepoints.is_empty() {
            0.0
        } else {
            let offset = 2;
            self.beta[offset..offset + self.changepoints.len()]
                .iter()
                .map(|d| d.abs())
                .sum::<f64>()
                / self.changepoints.len() as f64
                + 1e-8
        };
        let change_rate = self.changepoints.len() as f64 * (t_max - 1.0);

        let mut draws: Vec<Vec<f64>> = vec![Vec::with_capacity(samples); coords.len()];
        for _ in 0..samples {
            let mut extra = Vec::new();
            if !self.layout.flat && change_rate > 0.0 {
                let count = match Poisson::new(change_rate) {
                    Ok(p) => {
                        let draw: f64 = p.sample(&mut rng);
                        draw as usize
                    }
                    Err(_) => 0,
                };
                for _ in 0..count {
                    let c: f64 = rng.gen_range(1.0..t_max);
                    extra.push((c, sample_laplace(&mut rng, delta_scale)));
                }
            }

            for (i, &(t, year)) in coords.iter().enumerate() {
                let (total, _, _) = self.components_with(t, year, &extra);
                let eps = noise.map(|n| n.sample(&mut rng)).unwrap_or(0.0);
                draws[i].push(total + eps);
            }
        }

        let lower_q = (1.0 - self.options.interval_width) / 2.0;
        let upper_q = 1.0 - lower_q;
        draws
            .into_iter()
            .map(|mut values| {
                values.sort_by(|a, b| a.total_cmp(b));
                (percentile(&values, lower_q), percentile(&values, upper_q))
            })
            .collect()
    }
}

fn sample_laplace<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
}

/// Linear-interpolated quantile of sorted values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::{add_periods, period_range};

    fn seasonal_history(freq: Frequency, periods: u32, slope: f64) -> DatedSeries {
        let start = NaiveDate::from_ymd_opt(2013, 7, 1).unwrap();
        (0..periods)
            .map(|i| {
                let date = add_periods(start, i, freq);
                let season = 2.0 * std::f64::consts::PI * decimal_year(date);
                let wobble = ((i * 7919) % 13) as f64 * 0.1;
                (date, 100.0 + slope * i as f64 + 8.0 * season.cos() + wobble)
            })
            .collect()
    }

    #[test]
    fn test_fit_requires_observations() {
        let model = AdditiveModel::new(FitOptions::default(), Frequency::Monthly);
        let history = seasonal_history(Frequency::Monthly, 3, 0.0);
        assert!(model.fit(&history).is_err());
    }

    #[test]
    fn test_recovers_trend_and_season() {
        let options = FitOptions {
            uncertainty_samples: 200,
            ..FitOptions::default()
        };
        let model = AdditiveModel::new(options, Frequency::Monthly);
        let history = seasonal_history(Frequency::Monthly, 72, 0.5);
        let fitted = model.fit(&history).unwrap();

        let dates: Vec<NaiveDate> = history.keys().copied().collect();
        let points = fitted.predict(&dates);
        let mape: f64 = points
            .iter()
            .map(|p| ((p.total - history[&p.date]) / history[&p.date]).abs())
            .sum::<f64>()
            / points.len() as f64;
        assert!(mape < 0.02, "in-sample MAPE too large: {}", mape);

        // Seasonal swing is captured in the yearly component
        let max_yearly = points.iter().map(|p| p.yearly).fold(f64::MIN, f64::max);
        assert!(max_yearly > 4.0);
    }

    #[test]
    fn test_flat_growth_has_constant_trend() {
        let options = FitOptions::multiplicative().with_flat_growth(true);
        let model = AdditiveModel::new(options, Frequency::Quarterly);
        let history = seasonal_history(Frequency::Quarterly, 24, 0.0);
        let fitted = model.fit(&history).unwrap();
        assert_eq!(fitted.changepoint_count(), 0);

        let start = NaiveDate::from_ymd_opt(2013, 7, 1).unwrap();
        let stop = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let points = fitted.predict(&period_range(start, stop, Frequency::Quarterly));
        let first = points[0].trend;
        assert!(points.iter().all(|p| (p.trend - first).abs() < 1e-9));
    }

    #[test]
    fn test_intervals_bracket_prediction() {
        let model = AdditiveModel::new(FitOptions::default(), Frequency::Quarterly);
        let history = seasonal_history(Frequency::Quarterly, 28, 1.0);
        let fitted = model.fit(&history).unwrap();

        let start = NaiveDate::from_ymd_opt(2013, 7, 1).unwrap();
        let stop = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let points = fitted.predict(&period_range(start, stop, Frequency::Quarterly));
        assert!(points.iter().all(|p| p.lower <= p.upper));

        let first = &points[0];
        assert!(first.lower < first.total && first.total < first.upper);
    }

    #[test]
    fn test_seeded_predictions_are_deterministic() {
        let history = seasonal_history(Frequency::Monthly, 60, 0.3);
        let start = NaiveDate::from_ymd_opt(2013, 7, 1).unwrap();
        let stop = NaiveDate::from_ymd_opt(2022, 6, 30).unwrap();
        let dates = period_range(start, stop, Frequency::Monthly);

        let run = |seed: u64| {
            let options = FitOptions { seed, ..FitOptions::multiplicative() };
            AdditiveModel::new(options, Frequency::Monthly)
                .fit(&history)
                .unwrap()
                .predict(&dates)
        };

        assert_eq!(run(7), run(7));
        let a = run(7);
        let b = run(8);
        assert!(a.iter().zip(&b).any(|(x, y)| x.upper != y.upper));
        assert!(a.iter().zip(&b).all(|(x, y)| x.total == y.total));
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.5), 3.0);
        assert!((percentile(&values, 0.1) - 1.4).abs() < 1e-12);
    }
}

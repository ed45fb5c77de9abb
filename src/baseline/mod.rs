//! Baseline forecasts: statistical projections absent any scenario adjustment

pub mod cache;
mod forecast;
pub mod model;
pub mod transform;

pub use cache::{BaselineCache, CacheKey, DEFAULT_CACHE_DIR};
pub use forecast::{default_horizon, BaselineConfig, BaselineForecast, Component};
pub use model::{AdditiveModel, FitOptions, FittedModel, ForecastPoint, SectorPredictions, SeasonalityMode};

#[cfg(test)]
pub(crate) use forecast::tests as test_support;

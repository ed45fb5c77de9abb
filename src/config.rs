//! Run configuration
//!
//! Defaults reproduce the standard city run: quarterly baselines fit on
//! FY2014 through March 2020, scenarios applied January 2021 through June
//! 2022. Any field can be overridden from a TOML file:
//!
//! ```toml
//! forecast_start = "2021-01-01"
//! forecast_stop = "2022-06-30"
//! freq = "Q"
//! taxes = ["sales", "wage"]
//! seed = 7
//!
//! [[scenarios]]
//! name = "moderate"
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::baseline::{default_horizon, DEFAULT_CACHE_DIR};
use crate::collections::TaxName;
use crate::error::{ForecastError, Result};
use crate::fiscal::Frequency;
use crate::scenario::Scenario;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Settings for a full forecast run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// First date scenario adjustments apply to
    pub forecast_start: NaiveDate,
    /// Last date of scenario forecasts
    pub forecast_stop: NaiveDate,
    pub baseline_start: NaiveDate,
    pub baseline_stop: NaiveDate,
    /// Last date predicted by the baselines
    pub horizon: NaiveDate,
    pub freq: Frequency,
    pub scenarios: Vec<Scenario>,
    pub taxes: Vec<TaxName>,
    pub seed: u64,
    pub uncertainty_samples: usize,
    /// Directory for cached baselines; `None` disables caching
    pub cache_dir: Option<PathBuf>,
    /// Refit baselines even when cached
    pub fresh: bool,
    pub charts: bool,
    /// First date shown in comparison reports
    pub report_start: NaiveDate,
    /// Fiscal years in the FY totals sheets
    pub fiscal_years: Vec<i32>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            forecast_start: ymd(2021, 1, 1),
            forecast_stop: ymd(2022, 6, 30),
            baseline_start: ymd(2013, 7, 1),
            baseline_stop: ymd(2020, 3, 31),
            horizon: default_horizon(),
            freq: Frequency::Quarterly,
            scenarios: Scenario::defaults(),
            taxes: TaxName::ALL.to_vec(),
            seed: 42,
            uncertainty_samples: 1000,
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            fresh: false,
            charts: true,
            report_start: ymd(2020, 1, 1),
            fiscal_years: vec![2020, 2021, 2022],
        }
    }
}

impl ForecastConfig {
    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ForecastConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ForecastError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Check that the windows are ordered and the lists are usable
    pub fn validate(&self) -> Result<()> {
        if self.forecast_start > self.forecast_stop {
            return Err(ForecastError::Config(format!(
                "forecast_start {} is after forecast_stop {}",
                self.forecast_start, self.forecast_stop
            )));
        }
        if self.baseline_start >= self.baseline_stop {
            return Err(ForecastError::Config(format!(
                "baseline_start {} must be before baseline_stop {}",
                self.baseline_start, self.baseline_stop
            )));
        }
        if self.forecast_stop > self.horizon {
            return Err(ForecastError::Config(format!(
                "forecast_stop {} is beyond the baseline horizon {}",
                self.forecast_stop, self.horizon
            )));
        }
        if self.taxes.is_empty() {
            return Err(ForecastError::Config("no taxes configured".to_string()));
        }
        if self.scenarios.is_empty() {
            return Err(ForecastError::Config("no scenarios configured".to_string()));
        }

        let mut names = BTreeSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err(ForecastError::Config("scenario with empty name".to_string()));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(ForecastError::Config(format!(
                    "scenario '{}' listed twice",
                    scenario.name
                )));
            }
        }

        let unique: BTreeSet<TaxName> = self.taxes.iter().copied().collect();
        if unique.len() != self.taxes.len() {
            return Err(ForecastError::Config("tax listed twice".to_string()));
        }
        Ok(())
    }

    /// Configured taxes in alphabetical order
    pub fn sorted_taxes(&self) -> Vec<TaxName> {
        let unique: BTreeSet<TaxName> = self.taxes.iter().copied().collect();
        unique.into_iter().collect()
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ForecastConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scenario_names(), vec!["moderate", "severe"]);
        assert_eq!(config.taxes.len(), 8);
        assert_eq!(config.freq, Frequency::Quarterly);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = ForecastConfig::from_toml(
            r#"
            freq = "M"
            taxes = ["wage", "sales"]
            seed = 7
            charts = false
            forecast_start = "2021-03-01"
            "#,
        )
        .unwrap();

        assert_eq!(config.freq, Frequency::Monthly);
        assert_eq!(config.sorted_taxes(), vec![TaxName::Sales, TaxName::Wage]);
        assert_eq!(config.seed, 7);
        assert!(!config.charts);
        assert_eq!(config.forecast_start, ymd(2021, 3, 1));
        assert_eq!(config.forecast_stop, ymd(2022, 6, 30));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(ForecastConfig::from_toml("taxes = [\"hotel\"]").is_err());
        assert!(ForecastConfig::from_toml("taxes = []").is_err());
        assert!(ForecastConfig::from_toml(
            "forecast_start = \"2023-01-01\"\nforecast_stop = \"2022-01-01\""
        )
        .is_err());
        assert!(ForecastConfig::from_toml(
            "[[scenarios]]\nname = \"moderate\"\n[[scenarios]]\nname = \"moderate\""
        )
        .is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.toml");
        std::fs::write(&path, "uncertainty_samples = 10\n").unwrap();
        assert_eq!(ForecastConfig::from_path(&path).unwrap().uncertainty_samples, 10);
        assert!(ForecastConfig::from_path(dir.path().join("missing.toml")).is_err());
    }
}

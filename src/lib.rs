//! Revenue Forecast - Scenario forecasts of city tax revenue through the COVID-19 downturn
//!
//! This library provides:
//! - Loading of monthly collections, sector breakdowns and tax rates
//! - Baseline fitting with an additive trend plus yearly seasonality model
//! - Moderate and severe scenario adjustments per tax
//! - Comparisons across scenarios and taxes
//! - Spreadsheet, CSV and SVG exports

pub mod error;
pub mod fiscal;
pub mod frame;
pub mod collections;
pub mod baseline;
pub mod scenario;
pub mod taxes;
pub mod config;
pub mod report;

// Re-export commonly used types
pub use error::{ForecastError, Result};
pub use fiscal::Frequency;
pub use collections::{CsvDataSource, DataSource, TaxName};
pub use baseline::{BaselineConfig, BaselineForecast, FitOptions};
pub use scenario::{Adjustment, RevenueForecast, Scenario, ScenarioForecast, ScenarioRunner};
pub use taxes::TaxDefinition;
pub use config::ForecastConfig;
pub use report::{ScenarioComparison, WorkbookExporter};

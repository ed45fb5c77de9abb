//! Error types for revenue forecasting

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while loading data, fitting baselines, applying scenarios, or exporting
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown tax '{0}'; allowed values are amusement, birt, npt, parking, rtt, sales, soda, wage")]
    UnknownTax(String),

    #[error("No assumptions for scenario '{scenario}' in the {tax} forecast")]
    UnknownScenario { tax: String, scenario: String },

    #[error("Scenario '{0}' is not part of this comparison")]
    ScenarioNotRun(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Date {date} before min forecast date ({start})")]
    BeforeForecastStart { date: NaiveDate, start: NaiveDate },

    #[error("Date {date} after max forecast date ({stop})")]
    AfterForecastStop { date: NaiveDate, stop: NaiveDate },

    #[error("Size mismatch between forecast dates (length={dates}) and forecast declines (length={declines})")]
    LengthMismatch { dates: usize, declines: usize },

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl From<rust_xlsxwriter::XlsxError> for ForecastError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ForecastError::Export(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}

impl From<chrono::ParseError> for ForecastError {
    fn from(err: chrono::ParseError) -> Self {
        ForecastError::Parse(err.to_string())
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, ForecastError>;

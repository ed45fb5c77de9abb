//! Named scenarios and the adjustments they make to baselines

mod adjustment;
mod forecast;
mod runner;

use serde::{Deserialize, Serialize};

pub use adjustment::{Adjustment, Period, DEFAULT_GROUP};
pub use forecast::{ForecastResult, ForecastWindow, RevenueForecast};
pub use runner::{ScenarioForecast, ScenarioRunner, TaxOutcome, SUMMARY_KINDS};

/// A named macroeconomic assumption set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Scenario {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// The moderate and severe scenarios
    pub fn defaults() -> Vec<Scenario> {
        vec![
            Scenario::new("moderate", "Gradual recovery through FY2022"),
            Scenario::new("severe", "Deeper declines with a slower recovery"),
        ]
    }

    /// Capitalized name for sheet titles and chart legends
    pub fn title(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title() {
        assert_eq!(Scenario::new("moderate", "").title(), "Moderate");
        assert_eq!(Scenario::new("", "").title(), "");
    }
}

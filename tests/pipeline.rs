//! End-to-end runs over generated sample data

use std::path::Path;

use chrono::NaiveDate;
use tempfile::TempDir;

use revenue_forecast::baseline::Component;
use revenue_forecast::collections::sample::write_sample_data;
use revenue_forecast::fiscal::Frequency;
use revenue_forecast::report::workbook::tax_sheet_name;
use revenue_forecast::report::{chart, write_model_outputs, ScenarioComparison, TOTAL_ROW};
use revenue_forecast::{taxes, CsvDataSource, ForecastConfig, ScenarioRunner, TaxName, WorkbookExporter};

fn test_config(cache: Option<&Path>) -> ForecastConfig {
    ForecastConfig {
        uncertainty_samples: 50,
        cache_dir: cache.map(|p| p.to_path_buf()),
        seed: 11,
        ..ForecastConfig::default()
    }
}

fn run(config: &ForecastConfig, data_dir: &Path) -> (ScenarioRunner, ScenarioComparison) {
    let data = CsvDataSource::new(data_dir);
    let definitions = taxes::definitions(config);
    let runner = ScenarioRunner::fit(&definitions, config.scenarios.clone(), &data).unwrap();
    let comparison = runner.run_all().unwrap();
    (runner, comparison)
}

fn sample_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_sample_data(dir.path(), 3).unwrap();
    dir
}

#[test]
fn test_fixed_seed_is_deterministic() {
    let data = sample_dir();
    let config = test_config(None);

    let (first, first_cmp) = run(&config, data.path());
    let (second, second_cmp) = run(&config, data.path());

    for tax in TaxName::ALL {
        let a = first.get(tax).unwrap().baseline();
        let b = second.get(tax).unwrap().baseline();
        // Intervals come from seeded simulations, so they match too
        assert_eq!(a.forecasted_revenue(), b.forecasted_revenue(), "{}", tax);
    }
    assert_eq!(first_cmp, second_cmp);
}

#[test]
fn test_history_is_never_adjusted() {
    let data = sample_dir();
    let config = test_config(None);
    let (runner, comparison) = run(&config, data.path());

    for forecast in runner.forecasts() {
        let baseline = forecast.baseline().forecasted_revenue_frame(Component::Total);
        let history_end = config.forecast_start.pred_opt().unwrap();
        let expected = baseline.until(history_end);

        for scenario in comparison.scenarios() {
            let outcome = scenario.get(forecast.tax()).unwrap();
            assert_eq!(outcome.result.values.until(history_end), expected);
            let last = outcome.result.values.dates().into_iter().next_back().unwrap();
            assert!(last <= config.forecast_stop);
        }
    }
}

#[test]
fn test_severe_is_worse_than_moderate() {
    let data = sample_dir();
    let (_, comparison) = run(&test_config(None), data.path());

    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let fy = |name: &str| {
        let totals = comparison.fiscal_year_totals(name, start, &[2021, 2022]).unwrap();
        totals.get(&[TOTAL_ROW]).unwrap().cells.clone()
    };
    let moderate = fy("moderate");
    let severe = fy("severe");
    assert!(severe[1].unwrap() < moderate[1].unwrap());
}

#[test]
fn test_exports() {
    let data = sample_dir();
    let out = tempfile::tempdir().unwrap();
    let config = test_config(Some(&out.path().join("cache")));
    let (runner, comparison) = run(&config, data.path());

    let mut workbook = WorkbookExporter::from_config(&config).build(&runner, &comparison).unwrap();
    let names = workbook.sheet_names().to_vec();
    for tax in TaxName::ALL {
        assert_eq!(names.iter().filter(|n| **n == tax_sheet_name(tax)).count(), 1);
    }
    assert!(names.contains(&"Moderate Data".to_string()));
    assert!(names.contains(&"Comparison (Quarterly)".to_string()));
    assert!(names.contains(&"Norm. Comparison (Quarterly)".to_string()));
    assert!(names.contains(&"Total Shortfalls (Quarterly)".to_string()));
    assert!(names.contains(&"Severe FY Totals".to_string()));
    assert_eq!(names.len(), 8 + 2 + 3 + 2);

    let buffer = workbook.to_buffer().unwrap();
    assert_eq!(&buffer[..2], b"PK");
    let path = out.path().join("revenue-impact.xlsx");
    workbook.save(&path).unwrap();
    assert!(path.exists());

    let files = write_model_outputs(&runner, &comparison, out.path()).unwrap();
    assert_eq!(files.len(), 8 * (4 + 2));
    assert!(out.path().join("actuals/wage-revenue.csv").exists());
    assert!(out.path().join("baseline/sales-tax-base.csv").exists());
    assert!(out.path().join("forecasts/rtt-severe-revenue.csv").exists());

    let charts = chart::write_charts(&runner, &comparison, &out.path().join("charts"), config.report_start).unwrap();
    assert_eq!(charts.len(), 8 * (1 + 2 * 2));
    assert!(out.path().join("charts/soda-moderate-revenue.svg").exists());
}

#[test]
fn test_monthly_run() {
    let data = sample_dir();
    let config = ForecastConfig {
        freq: Frequency::Monthly,
        ..test_config(None)
    };
    config.validate().unwrap();
    let (runner, comparison) = run(&config, data.path());

    // Quarterly realty transfer projections are split across their months
    let rtt = comparison.get("moderate").unwrap().get(TaxName::Rtt).unwrap().result.total();
    let first_quarter: f64 = (1..=3)
        .map(|m| rtt[&NaiveDate::from_ymd_opt(2021, m, 1).unwrap()])
        .sum();
    approx::assert_relative_eq!(first_quarter, 58921540.64579399 + 16430490.674820002, max_relative = 1e-9);
    assert_eq!(rtt.keys().next_back().copied(), NaiveDate::from_ymd_opt(2022, 6, 1));

    let workbook = WorkbookExporter::from_config(&config).build(&runner, &comparison).unwrap();
    let names = workbook.sheet_names();
    assert!(names.contains(&"Comparison (Monthly)".to_string()));
    assert!(names.contains(&"Comparison (Quarterly)".to_string()));
    assert_eq!(names.len(), 8 + 2 + 3 * 2 + 2);
}

#[test]
fn test_cached_baselines_are_reused() {
    let data = sample_dir();
    let cache = tempfile::tempdir().unwrap();
    let config = test_config(Some(cache.path()));

    let (first, _) = run(&config, data.path());
    assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 8);

    // New collections do not change a cached fit unless refitting is forced
    write_sample_data(data.path(), 4).unwrap();
    let (cached, _) = run(&config, data.path());
    let fresh_config = ForecastConfig { fresh: true, ..config.clone() };
    let (refit, _) = run(&fresh_config, data.path());

    let soda = |r: &ScenarioRunner| r.get(TaxName::Soda).unwrap().baseline().forecasted_tax_base().clone();
    assert_eq!(soda(&first), soda(&cached));
    assert_ne!(soda(&first), soda(&refit));
}

//! SVG charts of baselines and scenario forecasts
//!
//! Revenue is plotted in millions against the decimal year.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;
use plotters::prelude::*;

use super::summary::ScenarioComparison;
use crate::baseline::{BaselineForecast, Component};
use crate::error::{ForecastError, Result};
use crate::fiscal::decimal_year;
use crate::frame::DatedSeries;
use crate::scenario::{ScenarioForecast, ScenarioRunner, TaxOutcome};

const CHART_SIZE: (u32, u32) = (960, 540);
const MILLIONS: f64 = 1e6;

const SCENARIO_COLORS: [RGBColor; 4] = [RED, MAGENTA, GREEN, CYAN];

struct Line {
    label: String,
    color: RGBColor,
    points: Vec<(f64, f64)>,
}

impl Line {
    fn new(label: &str, color: RGBColor, series: &DatedSeries, scale: f64) -> Self {
        Self {
            label: label.to_string(),
            color,
            points: series
                .iter()
                .map(|(&d, &v)| (decimal_year(d), v / scale))
                .collect(),
        }
    }
}

/// Shaded interval as (x, lower, upper)
type Band = Vec<(f64, f64, f64)>;

fn export_error<E: Display>(err: E) -> ForecastError {
    ForecastError::Export(format!("chart: {}", err))
}

fn bounds<I: Iterator<Item = f64>>(values: I, pad: f64) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let margin = (hi - lo) * pad;
    (lo - margin, hi + margin)
}

fn render(title: &str, y_desc: &str, lines: &[Line], band: Option<&Band>) -> Result<String> {
    let band_points = band.map(|b| b.as_slice()).unwrap_or(&[]);

    let (x0, x1) = bounds(
        lines
            .iter()
            .flat_map(|l| l.points.iter().map(|p| p.0))
            .chain(band_points.iter().map(|b| b.0)),
        0.0,
    );
    let (y0, y1) = bounds(
        lines
            .iter()
            .flat_map(|l| l.points.iter().map(|p| p.1))
            .chain(band_points.iter().flat_map(|b| [b.1, b.2])),
        0.05,
    );

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(export_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(export_error)?;

        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc(y_desc)
            .x_label_formatter(&|x| format!("{:.0}", x))
            .draw()
            .map_err(export_error)?;

        if !band_points.is_empty() {
            let mut outline: Vec<(f64, f64)> = band_points.iter().map(|&(x, lo, _)| (x, lo)).collect();
            outline.extend(band_points.iter().rev().map(|&(x, _, hi)| (x, hi)));
            chart
                .draw_series(std::iter::once(Polygon::new(outline, BLUE.mix(0.15).filled())))
                .map_err(export_error)?
                .label("Uncertainty interval")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.15).filled()));
        }

        for line in lines {
            let color = line.color;
            chart
                .draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(2)))
                .map_err(export_error)?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(export_error)?;

        root.present().map_err(export_error)?;
    }
    Ok(svg)
}

fn from_date(series: &DatedSeries, start: NaiveDate) -> DatedSeries {
    series.range(start..).map(|(&d, &v)| (d, v)).collect()
}

/// Baseline fit with its uncertainty band and the actual revenue
///
/// The band is the sum of the per-sector intervals.
pub fn baseline_chart(baseline: &BaselineForecast) -> Result<String> {
    let lower = baseline.forecasted_revenue_frame(Component::Lower).total();
    let upper = baseline.forecasted_revenue_frame(Component::Upper).total();
    let band: Band = lower
        .iter()
        .filter_map(|(d, &lo)| upper.get(d).map(|&hi| (decimal_year(*d), lo / MILLIONS, hi / MILLIONS)))
        .collect();

    let lines = [
        Line::new("Baseline", BLUE, &baseline.forecasted_total_revenue(), MILLIONS),
        Line::new("Actual", BLACK, &baseline.actual_total_revenue(), MILLIONS),
    ];
    render(
        &format!("{} baseline", baseline.tax().display_name()),
        "Revenue ($M)",
        &lines,
        Some(&band),
    )
}

/// Scenario forecast against the baseline and actuals from `start` on
pub fn forecast_chart(
    scenario: &ScenarioForecast,
    outcome: &TaxOutcome,
    color: RGBColor,
    start: NaiveDate,
) -> Result<String> {
    let lines = [
        Line::new("Baseline", BLUE, &from_date(&outcome.baseline, start), MILLIONS),
        Line::new(&scenario.scenario.title(), color, &from_date(&outcome.result.total(), start), MILLIONS),
        Line::new("Actual", BLACK, &from_date(&outcome.actual, start), MILLIONS),
    ];
    render(
        &format!("{} ({})", outcome.result.tax.display_name(), scenario.name()),
        "Revenue ($M)",
        &lines,
        None,
    )
}

/// Actuals and the scenario forecast as a share of the baseline
pub fn normalized_chart(
    scenario: &ScenarioForecast,
    outcome: &TaxOutcome,
    color: RGBColor,
    start: NaiveDate,
) -> Result<String> {
    let ratio = |series: &DatedSeries| -> DatedSeries {
        from_date(series, start)
            .into_iter()
            .filter_map(|(d, v)| {
                outcome
                    .baseline
                    .get(&d)
                    .filter(|b| b.abs() > f64::EPSILON)
                    .map(|b| (d, v / b))
            })
            .collect()
    };
    let unity: DatedSeries = from_date(&outcome.baseline, start).keys().map(|&d| (d, 1.0)).collect();

    let lines = [
        Line::new("Baseline", BLUE, &unity, 1.0),
        Line::new(&scenario.scenario.title(), color, &ratio(&outcome.result.total()), 1.0),
        Line::new("Actual", BLACK, &ratio(&outcome.actual), 1.0),
    ];
    render(
        &format!("{} relative to baseline ({})", outcome.result.tax.display_name(), scenario.name()),
        "Share of baseline",
        &lines,
        None,
    )
}

fn write_svg(path: &Path, svg: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, svg)?;
    Ok(())
}

/// Write every baseline and scenario chart under `dir`
pub fn write_charts(
    runner: &ScenarioRunner,
    comparison: &ScenarioComparison,
    dir: &Path,
    start: NaiveDate,
) -> Result<Vec<PathBuf>> {
    let colors: BTreeMap<&str, RGBColor> = comparison
        .scenario_names()
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, SCENARIO_COLORS[i % SCENARIO_COLORS.len()]))
        .collect();

    let mut written = Vec::new();
    for forecast in runner.forecasts() {
        let tax = forecast.tax();

        let path = dir.join(format!("{}-baseline.svg", tax));
        write_svg(&path, &baseline_chart(forecast.baseline())?)?;
        written.push(path);

        for scenario in comparison.scenarios() {
            let Some(outcome) = scenario.get(tax) else {
                continue;
            };
            let color = colors.get(scenario.name()).copied().unwrap_or(RED);

            let path = dir.join(format!("{}-{}-revenue.svg", tax, scenario.name()));
            write_svg(&path, &forecast_chart(scenario, outcome, color, start)?)?;
            written.push(path);

            let path = dir.join(format!("{}-{}-normalized.svg", tax, scenario.name()));
            write_svg(&path, &normalized_chart(scenario, outcome, color, start)?)?;
            written.push(path);
        }
    }

    info!("Wrote {} charts to {}", written.len(), dir.display());
    Ok(written)
}

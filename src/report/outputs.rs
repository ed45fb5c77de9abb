//! CSV exports of model inputs and outputs
//!
//! ```text
//! <dir>/actuals/<tax>-revenue.csv
//! <dir>/actuals/<tax>-tax-base.csv
//! <dir>/baseline/<tax>-revenue.csv
//! <dir>/baseline/<tax>-tax-base.csv
//! <dir>/forecasts/<tax>-<scenario>-revenue.csv
//! ```
//!
//! Actuals and forecasts are wide (one column per sector); baselines are
//! long with every predicted component.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use super::summary::ScenarioComparison;
use crate::baseline::SectorPredictions;
use crate::error::Result;
use crate::frame::SectorFrame;
use crate::scenario::ScenarioRunner;

#[derive(Debug, Serialize)]
struct PredictionRow<'a> {
    date: NaiveDate,
    sector: &'a str,
    total: f64,
    lower: f64,
    upper: f64,
    trend: f64,
    yearly: f64,
}

/// Write a frame with a `date` column followed by one column per sector
pub fn write_frame<W: Write>(frame: &SectorFrame, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let sectors = frame.sectors();

    let mut header = vec!["date".to_string()];
    header.extend(sectors.iter().cloned());
    csv_writer.write_record(&header)?;

    for date in frame.dates() {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        for sector in &sectors {
            record.push(frame.get(sector, date).map(|v| v.to_string()).unwrap_or_default());
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write predictions in long format, one row per sector and date
pub fn write_predictions<W: Write>(predictions: &SectorPredictions, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (sector, points) in predictions {
        for p in points {
            csv_writer.serialize(PredictionRow {
                date: p.date,
                sector,
                total: p.total,
                lower: p.lower,
                upper: p.upper,
                trend: p.trend,
                yearly: p.yearly,
            })?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::File::create(path)?)
}

/// Write the full CSV tree under `dir`, returning the files written
pub fn write_model_outputs(
    runner: &ScenarioRunner,
    comparison: &ScenarioComparison,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for forecast in runner.forecasts() {
        let tax = forecast.tax();
        let baseline = forecast.baseline();

        let path = dir.join("actuals").join(format!("{}-revenue.csv", tax));
        write_frame(baseline.actual_revenue(), create(&path)?)?;
        written.push(path);

        let path = dir.join("actuals").join(format!("{}-tax-base.csv", tax));
        write_frame(&baseline.actual_tax_base(), create(&path)?)?;
        written.push(path);

        let path = dir.join("baseline").join(format!("{}-revenue.csv", tax));
        write_predictions(baseline.forecasted_revenue(), create(&path)?)?;
        written.push(path);

        let path = dir.join("baseline").join(format!("{}-tax-base.csv", tax));
        write_predictions(baseline.forecasted_tax_base(), create(&path)?)?;
        written.push(path);

        for scenario in comparison.scenarios() {
            let Some(outcome) = scenario.get(tax) else {
                continue;
            };
            let path = dir
                .join("forecasts")
                .join(format!("{}-{}-revenue.csv", tax, scenario.name()));
            write_frame(&outcome.result.values, create(&path)?)?;
            written.push(path);
        }
    }

    info!("Wrote {} model output files to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::ForecastPoint;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_frame_csv_is_wide() {
        let mut frame = SectorFrame::new();
        frame.insert("Hotels", d(2021, 1), 1.5);
        frame.insert("Retail", d(2021, 1), 2.0);
        frame.insert("Retail", d(2021, 4), 3.0);

        let mut buf = Vec::new();
        write_frame(&frame, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "date,Hotels,Retail\n2021-01-01,1.5,2\n2021-04-01,,3\n");
    }

    #[test]
    fn test_predictions_csv_is_long() {
        let mut predictions = SectorPredictions::new();
        predictions.insert(
            "total".to_string(),
            vec![ForecastPoint {
                date: d(2021, 1),
                total: 10.0,
                lower: 8.0,
                upper: 12.0,
                trend: 9.0,
                yearly: 1.0,
            }],
        );

        let mut buf = Vec::new();
        write_predictions(&predictions, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,sector,total,lower,upper,trend,yearly"));
        assert_eq!(lines.next(), Some("2021-01-01,total,10.0,8.0,12.0,9.0,1.0"));
    }
}

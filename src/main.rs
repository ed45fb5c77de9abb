//! Revenue Forecast CLI
//!
//! Fits the tax baselines, runs every scenario and writes the spreadsheet,
//! CSV outputs and charts to an output directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use revenue_forecast::collections::loader::DEFAULT_DATA_PATH;
use revenue_forecast::fiscal::quarter_label;
use revenue_forecast::report::{chart, write_model_outputs, TOTAL_ROW};
use revenue_forecast::{taxes, CsvDataSource, ForecastConfig, ScenarioRunner, WorkbookExporter};

/// Name of the spreadsheet written to the output directory
const WORKBOOK_NAME: &str = "revenue-impact.xlsx";

#[derive(Parser)]
#[command(name = "revenue-forecast")]
#[command(about = "Forecast city tax revenue under COVID-19 scenarios", long_about = None)]
struct Cli {
    /// Directory for the spreadsheet, CSV outputs and charts
    output_dir: PathBuf,

    /// Directory holding collections.csv, sectors.csv and rates/
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    data_dir: PathBuf,

    /// TOML file overriding the default run settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remove the output directory before writing
    #[arg(long)]
    clean: bool,

    /// Refit baselines even when cached
    #[arg(long)]
    fresh: bool,

    /// Seed for the uncertainty intervals
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the SVG charts
    #[arg(long)]
    no_charts: bool,
}

fn load_config(cli: &Cli) -> Result<ForecastConfig> {
    let mut config = match &cli.config {
        Some(path) => ForecastConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ForecastConfig::default(),
    };

    if cli.fresh {
        config.fresh = true;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if cli.no_charts {
        config.charts = false;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    println!("Revenue Forecast v{}", env!("CARGO_PKG_VERSION"));
    println!("========================\n");
    println!(
        "Forecast window: {} to {} ({} to {}, {})",
        config.forecast_start,
        config.forecast_stop,
        quarter_label(config.forecast_start),
        quarter_label(config.forecast_stop),
        config.freq.label().to_lowercase()
    );
    println!("Scenarios: {}", config.scenario_names().join(", "));
    println!();

    let out = &cli.output_dir;
    if cli.clean && out.exists() {
        info!("Removing {}", out.display());
        fs::remove_dir_all(out).with_context(|| format!("removing {}", out.display()))?;
    }
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let data = CsvDataSource::new(&cli.data_dir);
    let definitions = taxes::definitions(&config);
    let runner = ScenarioRunner::fit(&definitions, config.scenarios.clone(), &data)
        .with_context(|| format!("fitting baselines from {}", cli.data_dir.display()))?;
    let comparison = runner.run_all().context("running scenarios")?;

    let workbook_path = out.join(WORKBOOK_NAME);
    let mut workbook = WorkbookExporter::from_config(&config).build(&runner, &comparison)?;
    workbook
        .save(&workbook_path)
        .with_context(|| format!("saving {}", workbook_path.display()))?;

    let outputs = write_model_outputs(&runner, &comparison, out).context("writing model outputs")?;

    let charts = if config.charts {
        chart::write_charts(&runner, &comparison, &out.join("charts"), config.report_start)
            .context("writing charts")?
    } else {
        Vec::new()
    };

    // FY totals summary, in thousands
    println!("Fiscal year totals ($000s):");
    for scenario in comparison.scenarios() {
        let totals = comparison
            .fiscal_year_totals(scenario.name(), config.forecast_start, &config.fiscal_years)?
            .scaled(1e-3);
        if let Some(row) = totals.get(&[TOTAL_ROW]) {
            let cells: Vec<String> = totals
                .columns()
                .iter()
                .zip(&row.cells)
                .map(|(c, v)| match v {
                    Some(v) => format!("{} {:>14.1}", c.header(), v),
                    None => format!("{} {:>14}", c.header(), "-"),
                })
                .collect();
            println!("  {:<10} {}", scenario.name(), cells.join("  "));
        }
    }

    println!("\nSpreadsheet: {} ({} sheets)", workbook_path.display(), workbook.sheet_names().len());
    println!("Model outputs: {} files", outputs.len());
    println!("Charts: {} files", charts.len());
    Ok(())
}

//! Generate synthetic input data for demo runs
//!
//! Writes collections.csv, sectors.csv and rates/<tax>.csv in the layout
//! expected by `revenue-forecast --data-dir`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use revenue_forecast::collections::sample::{sample_start, sample_stop, write_sample_data};

#[derive(Parser)]
#[command(name = "generate_sample_data")]
#[command(about = "Write synthetic collections, sectors and rates", long_about = None)]
struct Cli {
    /// Directory to write the CSV files to
    dir: PathBuf,

    /// Seed for the generated noise
    #[arg(long, default_value_t = 2020)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("Generating sample data...\n");
    write_sample_data(&cli.dir, cli.seed)
        .with_context(|| format!("writing sample data to {}", cli.dir.display()))?;

    println!("Collections: {} to {}", sample_start(), sample_stop());
    println!("Written to: {}", cli.dir.display());
    println!("\nRun: revenue-forecast <OUTPUT_DIR> --data-dir {}", cli.dir.display());
    Ok(())
}

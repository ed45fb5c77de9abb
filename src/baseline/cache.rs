//! On-disk cache of fitted baselines
//!
//! Fitting is the slow step of the pipeline, so predictions are stored as
//! CSV under `<cache_dir>/<tax>-baseline-<id>.csv`, where `id` is a short
//! digest of every parameter that changes the fit. A run with `fresh` set
//! refits and overwrites the entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::model::{FitOptions, ForecastPoint, SectorPredictions};
use crate::collections::TaxName;
use crate::error::Result;
use crate::fiscal::Frequency;

/// Default location of cached baselines
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Length of the hex identifier in cache file names
const ID_LENGTH: usize = 5;

/// Parameters that identify a fitted baseline
#[derive(Debug, Clone, Serialize)]
pub struct CacheKey<'a> {
    pub use_subsectors: bool,
    pub ignore_sectors: bool,
    pub freq: Frequency,
    pub fit_start: NaiveDate,
    pub fit_stop: NaiveDate,
    pub horizon: NaiveDate,
    pub fit_options: &'a FitOptions,
    pub crosswalk: Option<&'a BTreeMap<String, Vec<String>>>,
}

impl CacheKey<'_> {
    /// Short digest of the key with fields in sorted order
    pub fn identifier(&self) -> Result<String> {
        // serde_json::Value keeps object keys sorted
        let value = serde_json::to_value(self)?;
        let digest = Sha256::digest(serde_json::to_string(&value)?.as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(ID_LENGTH);
        Ok(id)
    }
}

/// One cached prediction
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    sector: String,
    date: NaiveDate,
    total: f64,
    lower: f64,
    upper: f64,
    trend: f64,
    yearly: f64,
}

/// Directory of cached baseline predictions
#[derive(Debug, Clone)]
pub struct BaselineCache {
    dir: PathBuf,
}

impl BaselineCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, tax: TaxName, id: &str) -> PathBuf {
        self.dir.join(format!("{}-baseline-{}.csv", tax, id))
    }

    /// Load a cached baseline, or `None` if no entry exists
    pub fn load(&self, tax: TaxName, id: &str) -> Result<Option<SectorPredictions>> {
        let path = self.path(tax, id);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut out: SectorPredictions = BTreeMap::new();
        for result in reader.deserialize() {
            let row: CacheRow = result?;
            out.entry(row.sector).or_default().push(ForecastPoint {
                date: row.date,
                total: row.total,
                lower: row.lower,
                upper: row.upper,
                trend: row.trend,
                yearly: row.yearly,
            });
        }
        if out.is_empty() {
            warn!("Ignoring empty cached {} baseline at {}", tax, path.display());
            return Ok(None);
        }
        for points in out.values_mut() {
            points.sort_by_key(|p| p.date);
        }

        debug!("Loaded cached {} baseline from {}", tax, path.display());
        Ok(Some(out))
    }

    /// Write a baseline to the cache, replacing any existing entry
    ///
    /// Rows go to a temporary file that is renamed into place once complete.
    pub fn store(&self, tax: TaxName, id: &str, predictions: &SectorPredictions) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(tax, id);
        let partial = path.with_extension("csv.partial");

        if let Err(e) = write_rows(&partial, predictions) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, &path)?;

        info!("Cached {} baseline at {}", tax, path.display());
        Ok(path)
    }
}

fn write_rows(path: &Path, predictions: &SectorPredictions) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (sector, points) in predictions {
        for p in points {
            writer.serialize(CacheRow {
                sector: sector.clone(),
                date: p.date,
                total: p.total,
                lower: p.lower,
                upper: p.upper,
                trend: p.trend,
                yearly: p.yearly,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

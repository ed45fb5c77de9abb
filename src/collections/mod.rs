//! Historical revenue collections and their loaders

mod data;
pub mod loader;
pub mod sample;

pub use data::{
    HistoricalSeries, SectorCollections, SectorRecord, ShareKey, TaxName, TaxRates,
};
pub use loader::{
    load_monthly_collections, load_sector_collections, load_tax_rates, CsvDataSource, DataSource,
};

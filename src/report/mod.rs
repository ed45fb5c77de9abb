//! Scenario reports and their exports
//!
//! Report tables are built from a [`ScenarioComparison`] and written as a
//! spreadsheet, a tree of CSV files and SVG charts.

pub mod chart;
pub mod outputs;
mod summary;
mod table;
pub mod workbook;

pub use outputs::write_model_outputs;
pub use summary::{ScenarioComparison, TidyRecord};
pub use table::{ColumnKey, ReportRow, ReportTable, TOTAL_ROW};
pub use workbook::{SpreadsheetReport, WorkbookExporter};

//! Field telemetry pipeline: per-channel samples aligned onto a fixed local
//! time grid, composed into per-device day records, fused across sources
//! and cleaned under source-dependent rules.

pub mod aligner;
pub mod cleaning;
pub mod climatology;
pub mod collector;
pub mod composer;
pub mod config;
pub mod db;
pub mod db_operations;
pub mod errors;
pub mod export;
pub mod fetch;
pub mod fusion;
pub mod grid;
pub mod ingest;
pub mod metrics;
pub mod parallel;
pub mod parsers;
pub mod processing;
pub mod resample;
pub mod retry;
pub mod schema;
pub mod store;
pub mod summary;
pub mod table;
pub mod weather;

#[cfg(test)]
mod tests;

pub use config::{load_config, AllAbsentPolicy, DeviceEntry, DeviceRegistry, PipelineConfig};
pub use errors::{ConfigError, FetchError, GridError, ParseError, PipelineError, TableError};
pub use grid::TimeGrid;
pub use ingest::Source;
pub use store::{CsvStore, TableStore};
pub use summary::{Outcome, RunSummary};
pub use table::{ColumnData, JoinOn, Table};

//! Storage boundary. Absent values are written as the `-1` sentinel and
//! decoded back to absent on read.

use crate::errors::PipelineError;
use crate::metrics::METRICS;
use crate::parallel::days_in_range;
use crate::parsers::{read_table_csv, write_table_csv, CsvTableOptions};
use crate::schema::INVERTER_NO_COLUMN;
use crate::table::Table;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::path::{Path, PathBuf};

pub const SP_TABLE: &str = "sp";
pub const AE_TABLE: &str = "ae";
pub const WS_TABLE: &str = "ws";
pub const DE_TABLE: &str = "de";
pub const PROCESSED_SP_TABLE: &str = "processed_sp";
pub const PROCESSED_AE_TABLE: &str = "processed_ae";
pub const PROCESSED_WS_TABLE: &str = "processed_ws";

pub const KNOWN_TABLES: &[&str] = &[
    SP_TABLE,
    AE_TABLE,
    WS_TABLE,
    DE_TABLE,
    PROCESSED_SP_TABLE,
    PROCESSED_AE_TABLE,
    PROCESSED_WS_TABLE,
];

/// Identifier column of a stored table, if rows are keyed by device.
pub fn identifier_for(table: &str) -> Option<&'static str> {
    match table {
        SP_TABLE | PROCESSED_SP_TABLE => Some(INVERTER_NO_COLUMN),
        _ => None,
    }
}

pub fn check_table_name(table: &str) -> Result<(), PipelineError> {
    if KNOWN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("unknown table '{}'", table)))
    }
}

/// Inclusive local time bounds of a date range.
pub fn range_bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        start.and_hms_opt(0, 0, 0).unwrap_or_default(),
        end.and_hms_opt(23, 59, 59).unwrap_or_default(),
    )
}

/// Table persistence keyed by local time. Replacing a range first removes
/// every stored row in it, so reruns are idempotent.
#[allow(async_fn_in_trait)]
pub trait TableStore {
    async fn read_range(&self, table: &str, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError>;

    /// Returns the number of rows written.
    async fn replace_range(
        &self,
        table: &str,
        start: NaiveDate,
        end: NaiveDate,
        data: &Table,
    ) -> Result<u64, PipelineError>;
}

/// One CSV file per table per day: `<root>/<table>/<table>_<date>.csv`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_path(&self, table: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(table)
            .join(format!("{}_{}.csv", table, date.format("%Y-%m-%d")))
    }

    fn remove_day(path: &Path) -> Result<(), PipelineError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::StorageIo {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl TableStore for CsvStore {
    async fn read_range(&self, table: &str, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError> {
        check_table_name(table)?;
        let options = CsvTableOptions::stored(identifier_for(table));
        let mut days = Vec::new();
        for date in days_in_range(start, end) {
            let path = self.day_path(table, date);
            if path.exists() {
                days.push(read_table_csv(&path, &options)?);
            }
        }
        let (from, to) = range_bounds(start, end);
        let mut combined = Table::concat_rows(&days)?.filter_time_range(from, to);
        if let Some(id) = identifier_for(table) {
            if combined.has_column(id) {
                combined.ensure_text(id);
                combined.set_identifier(Some(id));
            }
        }
        debug!("Read {} rows of {} from {}", combined.len(), table, self.root.display());
        Ok(combined)
    }

    async fn replace_range(
        &self,
        table: &str,
        start: NaiveDate,
        end: NaiveDate,
        data: &Table,
    ) -> Result<u64, PipelineError> {
        check_table_name(table)?;
        let mut written = 0u64;
        for date in days_in_range(start, end) {
            let path = self.day_path(table, date);
            Self::remove_day(&path)?;
            let (from, to) = range_bounds(date, date);
            let day = data.filter_time_range(from, to);
            if day.is_empty() {
                continue;
            }
            write_table_csv(&path, &day)?;
            written += day.len() as u64;
        }
        info!("Replaced {} rows of {} for {}..={}", written, table, start, end);
        METRICS.lock().record_rows_written(written);
        Ok(written)
    }
}

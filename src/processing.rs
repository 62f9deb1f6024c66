//! Processed-table stage: raw tables from the store are cleaned and written
//! back as `processed_*`; power-quality files become the `de` table.

use crate::cleaning::{clean_ae, clean_sp};
use crate::climatology::ReferenceBounds;
use crate::errors::PipelineError;
use crate::ingest::Source;
use crate::parsers::power_quality::files_in_range;
use crate::parsers::load_power_quality_csv;
use crate::store::{TableStore, DE_TABLE};
use crate::summary::{Outcome, RunSummary};
use crate::table::Table;
use crate::time_operation;
use crate::weather::add_weather_score;
use chrono::NaiveDate;
use log::{info, warn};
use std::path::Path;

pub fn process_ae(mut ae: Table, bounds: &ReferenceBounds) -> Result<Table, PipelineError> {
    let report = clean_ae(&mut ae, bounds)?;
    info!("ae: {} GHI readings outside reference bounds", report.bounds_violations);
    Ok(ae)
}

pub fn process_ws(mut ws: Table) -> Result<Table, PipelineError> {
    add_weather_score(&mut ws)?;
    Ok(ws)
}

pub fn process_sp(mut sp: Table, bounds: &ReferenceBounds) -> Result<Table, PipelineError> {
    let report = clean_sp(&mut sp, bounds)?;
    info!(
        "sp: {} off-state values zeroed, {} readings outside reference bounds",
        report.off_state_forced, report.bounds_violations
    );
    Ok(sp)
}

/// Every power-quality file dated in `[start, end]`, one table. Files that
/// fail to load are reported and skipped.
pub fn load_de(
    de_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    summary: &mut RunSummary,
) -> Result<Table, PipelineError> {
    let mut days = Vec::new();
    for (date, path) in files_in_range(de_dir, start, end) {
        match load_power_quality_csv(&path) {
            Ok(table) => days.push(table),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                summary.record(date, DE_TABLE, Outcome::Skipped(e.to_string()));
            }
        }
    }
    if days.is_empty() {
        return Err(PipelineError::NoData {
            source_name: DE_TABLE.to_string(),
            start,
            end,
        });
    }
    let mut de = Table::concat_rows(&days)?;
    de.sort_by_time();
    Ok(de)
}

/// Run the processed-table stage for `sources` over `[start, end]`.
/// Reference bounds are loaded once, only when a source needs them.
pub async fn run_processing<S: TableStore>(
    store: &S,
    data_dir: &Path,
    climatology_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    sources: &[Source],
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new();
    let bounds = if sources.iter().any(|s| matches!(s, Source::Sp | Source::Ae)) {
        Some(ReferenceBounds::load_dir(climatology_dir)?)
    } else {
        None
    };

    for &source in sources {
        let processed = match (source, bounds.as_ref()) {
            (Source::De, _) => time_operation!(
                "process de",
                load_de(&data_dir.join("de"), start, end, &mut summary)
            ),
            (Source::Ws, _) => {
                let raw = store.read_range(source.raw_table(), start, end).await?;
                if raw.is_empty() {
                    Err(no_raw_rows(source, start, end))
                } else {
                    time_operation!("process ws", process_ws(raw))
                }
            }
            (Source::Ae | Source::Sp, Some(bounds)) => {
                let raw = store.read_range(source.raw_table(), start, end).await?;
                if raw.is_empty() {
                    Err(no_raw_rows(source, start, end))
                } else if source == Source::Ae {
                    time_operation!("process ae", process_ae(raw, bounds))
                } else {
                    time_operation!("process sp", process_sp(raw, bounds))
                }
            }
            (Source::Ae | Source::Sp, None) => {
                return Err(PipelineError::Climatology("reference bounds not loaded".to_string()))
            }
        };

        match processed {
            Ok(table) => {
                let rows = store
                    .replace_range(source.processed_table(), start, end, &table)
                    .await?;
                info!("Wrote {} rows to {}", rows, source.processed_table());
            }
            Err(e @ PipelineError::NoData { .. }) => {
                warn!("{}", e);
                summary.record(start, source.processed_table(), Outcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

fn no_raw_rows(source: Source, start: NaiveDate, end: NaiveDate) -> PipelineError {
    PipelineError::NoData {
        source_name: source.raw_table().to_string(),
        start,
        end,
    }
}

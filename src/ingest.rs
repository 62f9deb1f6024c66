//! Raw-table stage: per-day source files into the `sp`, `ae` and `ws`
//! tables.

use crate::collector::{environmental_day_path, operating_day_path};
use crate::errors::PipelineError;
use crate::fusion::{build_site_record, SiteRecordReport};
use crate::parallel::{days_in_range, DayProcessor};
use crate::parsers::{read_table_csv, CsvTableOptions};
use crate::resample::{aggregate_duplicates, range_slots, reindex_exact};
use crate::schema::{AE_COLUMNS, DEVICE_ID_COLUMN};
use crate::store::{
    TableStore, AE_TABLE, DE_TABLE, PROCESSED_AE_TABLE, PROCESSED_SP_TABLE, PROCESSED_WS_TABLE, SP_TABLE,
    WS_TABLE,
};
use crate::summary::{Outcome, RunSummary};
use crate::table::{Table, TIME_COLUMN};
use crate::time_operation;
use crate::weather::normalize_hourly;
use chrono::NaiveDate;
use clap::ValueEnum;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

const AE_RENAMES: &[(&str, &str)] = &[("GHI", "ghi"), ("POA", "poa")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Source {
    /// Site inverters and sensors.
    Sp,
    /// Irradiance station.
    Ae,
    /// Weather station.
    Ws,
    /// Power-quality meter.
    De,
}

impl Source {
    pub const RAW: [Source; 3] = [Source::Sp, Source::Ae, Source::Ws];
    pub const ALL: [Source; 4] = [Source::Sp, Source::Ae, Source::Ws, Source::De];

    pub fn raw_table(self) -> &'static str {
        match self {
            Source::Sp => SP_TABLE,
            Source::Ae => AE_TABLE,
            Source::Ws => WS_TABLE,
            Source::De => DE_TABLE,
        }
    }

    pub fn processed_table(self) -> &'static str {
        match self {
            Source::Sp => PROCESSED_SP_TABLE,
            Source::Ae => PROCESSED_AE_TABLE,
            Source::Ws => PROCESSED_WS_TABLE,
            Source::De => DE_TABLE,
        }
    }
}

pub fn ae_day_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir.join("ae").join(format!("ae_{}.csv", date.format("%Y-%m-%d")))
}

pub fn ws_day_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir.join("ws").join(format!("ws_{}.csv", date.format("%Y-%m-%d")))
}

fn no_data(source: Source, start: NaiveDate, end: NaiveDate) -> PipelineError {
    PipelineError::NoData {
        source_name: source.raw_table().to_string(),
        start,
        end,
    }
}

/// Site record of one day and its fusion report, or `None` when either day
/// file is missing.
pub fn load_sp_day(
    data_dir: &Path,
    date: NaiveDate,
) -> Result<Option<(Table, SiteRecordReport)>, PipelineError> {
    let operating_path = operating_day_path(data_dir, date);
    let environmental_path = environmental_day_path(data_dir, date);
    if !operating_path.exists() || !environmental_path.exists() {
        debug!("No complete sp day files for {}", date);
        return Ok(None);
    }
    let options = CsvTableOptions::stored(Some(DEVICE_ID_COLUMN));
    let operating = read_table_csv(&operating_path, &options)?;
    let environmental = read_table_csv(&environmental_path, &options)?;
    let (site, report) = build_site_record(&operating, &environmental)?;
    if !report.synthesized.is_empty() {
        warn!("{}: site fields synthesized absent: {}", date, report.synthesized.join(", "));
    }
    Ok(Some((site, report)))
}

/// Site records over the range, one day per rayon task.
pub fn load_sp(
    data_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    summary: &mut RunSummary,
) -> Result<Table, PipelineError> {
    let results = DayProcessor::new().process_days("sp ingest", days_in_range(start, end), |date| {
        load_sp_day(data_dir, date)
    });

    let mut days = Vec::new();
    for day in results {
        match day.result {
            Ok(Some((table, report))) => {
                if report.rows_without_inverter > 0 {
                    summary.record(
                        day.date,
                        SP_TABLE,
                        Outcome::RowsWithoutInverter(report.rows_without_inverter),
                    );
                }
                days.push(table);
            }
            Ok(None) => summary.record(
                day.date,
                SP_TABLE,
                Outcome::Skipped("operating or environmental day file missing".to_string()),
            ),
            Err(e) => summary.record(day.date, SP_TABLE, Outcome::Skipped(e.to_string())),
        }
    }
    if days.is_empty() {
        return Err(no_data(Source::Sp, start, end));
    }
    let mut site = Table::concat_rows(&days)?;
    site.sort_by_time_and_identifier();
    Ok(site)
}

pub(crate) fn read_ae_day(path: &Path) -> Result<Table, PipelineError> {
    let mut table = read_table_csv(path, &CsvTableOptions::default())?;
    let index_columns: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| name.to_ascii_lowercase().contains("index"))
        .map(str::to_string)
        .collect();
    for name in index_columns {
        table.remove_column(&name);
    }
    for (from, to) in AE_RENAMES {
        if table.has_column(from) && !table.has_column(to) {
            table.rename_column(from, to)?;
        }
    }
    Ok(table)
}

/// Irradiance readings on every minute of the range. Repeated timestamps
/// are averaged first.
pub fn load_ae(data_dir: &Path, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError> {
    let mut days = Vec::new();
    for date in days_in_range(start, end) {
        let path = ae_day_path(data_dir, date);
        if path.exists() {
            days.push(read_ae_day(&path)?);
        }
    }
    if days.is_empty() {
        return Err(no_data(Source::Ae, start, end));
    }

    let mut raw = Table::concat_rows(&days)?;
    for name in AE_COLUMNS {
        raw.ensure_numeric(name);
    }
    let projected = raw.select(AE_COLUMNS)?;
    let slots = range_slots(
        start.and_hms_opt(0, 0, 0).unwrap_or_default(),
        end.and_hms_opt(23, 59, 0).unwrap_or_default(),
        1,
    );
    Ok(reindex_exact(&aggregate_duplicates(&projected)?, &slots)?)
}

/// Hourly weather over the range. The day before `start` is read too so
/// readings just before midnight can round into 00:00.
pub fn load_ws(data_dir: &Path, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError> {
    let first = start.pred_opt().unwrap_or(start);
    let options = CsvTableOptions {
        time_columns: &[TIME_COLUMN],
        ..CsvTableOptions::default()
    };
    let mut days = Vec::new();
    for date in days_in_range(first, end) {
        let path = ws_day_path(data_dir, date);
        if path.exists() {
            days.push(read_table_csv(&path, &options)?);
        }
    }
    if days.is_empty() {
        return Err(no_data(Source::Ws, start, end));
    }
    let mut raw = Table::concat_rows(&days)?;
    raw.sort_by_time();
    normalize_hourly(&raw, start, end).map_err(PipelineError::from)
}

/// Build and store the raw tables of `sources` over `[start, end]`. A source
/// with no input files is reported in the summary and skipped.
pub async fn run_ingest<S: TableStore>(
    store: &S,
    data_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    sources: &[Source],
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new();
    for &source in sources {
        let loaded = match source {
            Source::Sp => time_operation!("ingest sp", load_sp(data_dir, start, end, &mut summary)),
            Source::Ae => time_operation!("ingest ae", load_ae(data_dir, start, end)),
            Source::Ws => time_operation!("ingest ws", load_ws(data_dir, start, end)),
            Source::De => {
                info!("Power-quality data is loaded by the processing stage");
                continue;
            }
        };
        match loaded {
            Ok(table) => {
                let rows = store.replace_range(source.raw_table(), start, end, &table).await?;
                info!("Ingested {} rows into {}", rows, source.raw_table());
            }
            Err(e @ PipelineError::NoData { .. }) => {
                warn!("{}", e);
                summary.record(start, source.raw_table(), Outcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CsvStore;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_ae_drops_index_renames_and_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        write(
            &ae_day_path(dir.path(), date),
            "index,Time,GHI,POA,ambient_temp,module_temp\n\
             0,2024-06-12 10:00:00,500,520,25,40\n\
             1,2024-06-12 10:00:00,600,540,25,40\n\
             2,2024-06-12 10:02:00,,530,26,41\n",
        );

        let ae = load_ae(dir.path(), date, date).unwrap();
        assert_eq!(ae.len(), 1440);
        assert_eq!(ae.column_names(), AE_COLUMNS.to_vec());
        let ghi = ae.numeric("ghi").unwrap();
        assert_eq!(ghi[600], Some(550.0));
        assert_eq!(ghi[601], None);
        assert_eq!(ghi[602], None);
        assert_eq!(ae.numeric("poa").unwrap()[602], Some(530.0));
    }

    #[test]
    fn test_load_sp_records_rows_without_inverter() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        write(
            &operating_day_path(dir.path(), date),
            "time,ac_power,device_id\n\
             2024-06-12 00:00:00,5,29\n",
        );
        write(
            &environmental_day_path(dir.path(), date),
            "time,ambient_temp1,ambient_temp2,ambient_rh,ir,inv_temp1,inv_temp2,inv_rh,device_id\n\
             2024-06-12 00:00:00,20,21,50,0,35,36,10,29\n\
             2024-06-12 00:05:00,20,21,50,0,,,,\n",
        );

        let mut summary = RunSummary::new();
        let site = load_sp(dir.path(), date, date, &mut summary).unwrap();
        assert_eq!(site.len(), 1);
        assert_eq!(site.numeric("cap_temp").unwrap(), &[Some(35.0)]);
        assert_eq!(summary.entries().len(), 1);
        assert_eq!(summary.entries()[0].subject, SP_TABLE);
        assert_eq!(summary.entries()[0].outcome, Outcome::RowsWithoutInverter(1));
    }

    #[test]
    fn test_load_ws_reads_previous_day() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        write(
            &ws_day_path(dir.path(), date.pred_opt().unwrap()),
            "time,ambient_temperature,relative_humidity,weather_condition\n\
             2024-06-11 23:51:00,20,80,Fog\n",
        );
        write(
            &ws_day_path(dir.path(), date),
            "time,ambient_temperature,relative_humidity,weather_condition\n\
             2024-06-12 05:51:00,22,70,\n",
        );

        let ws = load_ws(dir.path(), date, date).unwrap();
        assert_eq!(ws.len(), 24);
        assert_eq!(ws.numeric("ambient_temperature").unwrap()[0], Some(20.0));
        assert_eq!(ws.text("weather_condition").unwrap()[0].as_deref(), Some("Fog"));
        assert_eq!(ws.numeric("ambient_temperature").unwrap()[6], Some(22.0));
        assert_eq!(ws.text("weather_condition").unwrap()[6].as_deref(), Some("UNKNOWN"));
    }

    #[tokio::test]
    async fn test_run_ingest_skips_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        write(
            &ae_day_path(dir.path(), date),
            "Time,GHI,POA,ambient_temp,module_temp\n2024-06-12 12:00:00,800,820,30,45\n",
        );
        let store = CsvStore::new(dir.path().join("store"));

        let summary = run_ingest(&store, dir.path(), date, date, &Source::RAW).await.unwrap();
        let skipped = |table: &str| summary.entries().iter().filter(|e| e.subject == table).count();
        assert_eq!(skipped(SP_TABLE), 2);
        assert_eq!(skipped(WS_TABLE), 1);
        assert_eq!(summary.count_where(|o| matches!(o, Outcome::Skipped(_))), 3);

        let ae = store.read_range(AE_TABLE, date, date).await.unwrap();
        assert_eq!(ae.len(), 1440);
        assert_eq!(ae.numeric("ghi").unwrap()[720], Some(800.0));
    }
}

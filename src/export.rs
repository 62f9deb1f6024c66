//! Single-device export: one inverter's operating and environmental rows
//! joined with irradiance, cleaned by the GHI rule.

use crate::cleaning::impute_with_ghi;
use crate::collector::{environmental_day_path, operating_day_path};
use crate::errors::PipelineError;
use crate::ingest::{ae_day_path, read_ae_day};
use crate::parallel::days_in_range;
use crate::parsers::{read_table_csv, write_table_csv, CsvTableOptions};
use crate::resample::resample_mean;
use crate::schema::{DEVICE_ID_COLUMN, EXPORT_COLUMNS, EXPORT_SP_FIELDS};
use crate::table::{JoinOn, Table};
use chrono::NaiveDate;
use log::{info, warn};
use std::path::{Path, PathBuf};

const EXPORT_GHI: &str = "AE_GHI";
const EXPORT_AC_POWER: &str = "SP_ac_power";
const AC_PHASES: &[&str] = &["ac_power_l1", "ac_power_l2", "ac_power_l3"];
const EXPORT_INTERVAL_MINUTES: u32 = 5;

/// Export field and the joined column it is copied from.
const EXPORT_FIELD_SOURCES: &[(&str, &str)] = &[
    ("SP_ambient_temp", "ambient_temp1"),
    ("SP_rh", "ambient_rh"),
    ("SP_cap_temp", "inv_temp1"),
    ("SP_relay_temp", "inv_temp2"),
    ("SP_internal_rh", "inv_rh"),
];

pub fn export_file_name(start: NaiveDate, end: NaiveDate, device: &str) -> String {
    format!(
        "export_data_{}-{}_{}.csv",
        start.format("%Y%m%d"),
        end.format("%Y%m%d"),
        device
    )
}

fn rows_of(table: &Table, device: &str) -> Table {
    let keys = table.identifier_keys();
    table.filter_rows(|i| keys[i].as_deref() == Some(device))
}

/// Mean of the phase powers present on each row.
fn mean_phase_power(table: &Table) -> Result<Vec<Option<f64>>, PipelineError> {
    let phases: Vec<&[Option<f64>]> = AC_PHASES
        .iter()
        .filter(|p| table.has_column(p))
        .map(|p| table.numeric(p))
        .collect::<Result<_, _>>()?;
    Ok((0..table.len())
        .map(|row| {
            let present: Vec<f64> = phases.iter().filter_map(|p| p[row]).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect())
}

/// Pick the device rows, join them with irradiance on time and project onto
/// the export columns. Returns the table and the device used.
pub fn build_export(
    operating: &Table,
    environmental: &Table,
    irradiance: &Table,
    device: Option<&str>,
) -> Result<(Table, String), PipelineError> {
    let available = operating.distinct_identifiers();
    let device = match device {
        Some(requested) if available.iter().any(|d| d == requested) => requested.to_string(),
        Some(requested) => return Err(PipelineError::UnknownDevice(requested.to_string())),
        None => available
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::UnknownDevice("<none>".to_string()))?,
    };

    let environmental_devices = environmental.distinct_identifiers();
    let environmental_device = if environmental_devices.iter().any(|d| *d == device) {
        device.clone()
    } else if let Some(first) = environmental_devices.first() {
        warn!(
            "Device {} has no environmental rows, using environmental device {}",
            device, first
        );
        first.clone()
    } else {
        device.clone()
    };

    let (op, _) = rows_of(operating, &device).dedup_keep_first(JoinOn::Time)?;
    let env = if environmental.identifier().is_some() {
        rows_of(environmental, &environmental_device)
    } else {
        environmental.clone()
    };
    let (env, _) = env.dedup_keep_first(JoinOn::Time)?;

    let mut ghi = irradiance.select(&["ghi"])?;
    ghi.sort_by_time();
    let ghi = resample_mean(&ghi, EXPORT_INTERVAL_MINUTES)?;

    let joined = op
        .outer_join(&env, JoinOn::Time, "_env")?
        .outer_join(&ghi, JoinOn::Time, "_ae")?;
    let (joined, _) = joined.dedup_keep_first(JoinOn::Time)?;

    let mut export = Table::new(joined.time().to_vec());
    let ghi_values: Vec<Option<f64>> = match joined.column("ghi") {
        Some(_) => joined.numeric("ghi")?.iter().map(|v| Some(v.unwrap_or(0.0))).collect(),
        None => vec![Some(0.0); joined.len()],
    };
    export.add_numeric(EXPORT_GHI, ghi_values)?;
    for (target, source) in EXPORT_FIELD_SOURCES {
        let values = if joined.has_column(source) {
            joined.numeric(source)?.to_vec()
        } else {
            vec![None; joined.len()]
        };
        export.add_numeric(target, values)?;
    }
    export.add_numeric(EXPORT_AC_POWER, mean_phase_power(&joined)?)?;
    let mut export = export.select(EXPORT_COLUMNS)?;

    let report = impute_with_ghi(&mut export, EXPORT_GHI, EXPORT_SP_FIELDS)?;
    info!(
        "Export for device {}: {} rows, {} zero-filled, {} neighbour-filled, {} defaulted",
        device,
        export.len(),
        report.zero_filled,
        report.neighbour_filled,
        report.default_filled
    );
    Ok((export, device))
}

fn read_days(
    start: NaiveDate,
    end: NaiveDate,
    path_for: impl Fn(NaiveDate) -> PathBuf,
    read: impl Fn(&Path) -> Result<Table, PipelineError>,
) -> Result<Vec<Table>, PipelineError> {
    let mut days = Vec::new();
    for date in days_in_range(start, end) {
        let path = path_for(date);
        if path.exists() {
            days.push(read(&path)?);
        } else {
            warn!("File not found: {}", path.display());
        }
    }
    Ok(days)
}

fn combined(days: Vec<Table>, source: &str, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError> {
    if days.is_empty() {
        return Err(PipelineError::NoData {
            source_name: source.to_string(),
            start,
            end,
        });
    }
    let mut table = Table::concat_rows(&days)?;
    table.sort_by_time();
    Ok(table)
}

/// Build the export from the per-day files under `data_dir` and write it to
/// `output_dir`. Returns the written path.
pub fn export_range(
    data_dir: &Path,
    output_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    device: Option<&str>,
) -> Result<PathBuf, PipelineError> {
    let options = CsvTableOptions::stored(Some(DEVICE_ID_COLUMN));
    let read_sp = |path: &Path| read_table_csv(path, &options).map_err(PipelineError::from);

    let operating = combined(
        read_days(start, end, |d| operating_day_path(data_dir, d), read_sp)?,
        "sp operating",
        start,
        end,
    )?;
    let environmental = combined(
        read_days(start, end, |d| environmental_day_path(data_dir, d), read_sp)?,
        "sp environmental",
        start,
        end,
    )?;
    let mut irradiance = combined(
        read_days(start, end, |d| ae_day_path(data_dir, d), read_ae_day)?,
        "ae",
        start,
        end,
    )?;
    irradiance.ensure_numeric("ghi");

    let (export, device) = build_export(&operating, &environmental, &irradiance, device)?;
    let path = output_dir.join(export_file_name(start, end, &device));
    write_table_csv(&path, &export)?;
    info!("Exported {} rows to {}", export.len(), path.display());
    Ok(path)
}

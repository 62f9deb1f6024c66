use crate::errors::ParseError;
use crate::parsers::csv_table::parse_numeric_cell;
use crate::resample::{range_slots, reindex_exact};
use crate::table::{Table, TIME_COLUMN};
use chrono::{NaiveDate, NaiveTime};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Headers written by the power-quality file converter, in table order.
pub const DE_RAW_HEADERS: &[&str] = &[
    "Time",
    "Current NG (RMS) (RMS)",
    "Current NG (RMS)",
    "Current AN (RMS) (RMS)",
    "Current AN (RMS)",
    "Current LineToNeutralAverage (RMS)",
    "Current BN (RMS)",
    "Current CN (RMS)",
    "Current AN (TotalTHD)",
    "Current BN (TotalTHD)",
    "Current CN (TotalTHD)",
    "Power Total (S)",
    "Power Total (Q)",
    "Power Total (P)",
    "Voltage AN (TotalTHD)",
    "Voltage BN (TotalTHD)",
    "Voltage CN (TotalTHD)",
    "Voltage AN (FlkrPLT)",
    "Voltage BN (FlkrPLT)",
    "Voltage BN (FlkrPST)",
    "Voltage CN (FlkrPLT)",
    "Voltage CN (FlkrPST)",
    "Voltage AN (FlkrPST)",
    "Voltage AN (RMS)",
    "Voltage BN (RMS)",
    "Voltage CN (RMS)",
    "Voltage LineToNeutralAverage (RMS)",
];

pub const DE_INTERVAL_MINUTES: u32 = 15;

/// Hours and minutes with a fractional tail, as in `00:15.000`.
const MINUTES_FRACTION: &str = "%H:%M.%f";
const TIME_OF_DAY_FORMATS: &[&str] = &[MINUTES_FRACTION, "%H:%M:%S", "%H:%M:%S%.f"];

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex is valid"));
static REPEATED_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("static regex is valid"));

/// `Current LineToNeutralAverage (RMS)` -> `current_line_to_neutral_average_rms`.
pub fn normalize_header(header: &str) -> String {
    let trimmed = header.trim();
    if trimmed.eq_ignore_ascii_case(TIME_COLUMN) {
        return TIME_COLUMN.to_string();
    }
    let expanded = trimmed.replace("LineToNeutralAverage", "Line_To_Neutral_Average");
    let underscored = NON_ALPHANUMERIC.replace_all(&expanded, "_");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&underscored, "_");
    collapsed.trim_matches('_').to_lowercase()
}

/// Normalized data columns of the `de` table, excluding `time`.
pub fn de_columns() -> Vec<String> {
    DE_RAW_HEADERS[1..].iter().map(|h| normalize_header(h)).collect()
}

/// Recording date from a `YYYYMMDD*.csv` file name.
pub fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let prefix = name.get(..8)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

/// Power-quality CSV files under `dir` whose file date is in `[start, end]`,
/// ordered by date.
pub fn files_in_range(dir: &Path, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, PathBuf)> {
    let pattern = dir.join("*.csv");
    let mut files: Vec<(NaiveDate, PathBuf)> = match glob::glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .filter_map(|p| date_from_file_name(&p).map(|d| (d, p)))
            .filter(|(d, _)| *d >= start && *d <= end)
            .collect(),
        Err(e) => {
            warn!("Invalid power-quality file pattern {}: {}", pattern.display(), e);
            Vec::new()
        }
    };
    files.sort();
    files
}

pub fn load_power_quality_csv(path: &Path) -> Result<Table, ParseError> {
    let date = date_from_file_name(path).ok_or_else(|| ParseError::FileNameDate {
        path: path.to_path_buf(),
    })?;
    let file = std::fs::File::open(path).map_err(|e| ParseError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_power_quality_from(file, path, date)
}

/// Read one day of readings and reindex them exactly onto the 15-minute
/// grid 00:00..23:45. Every `de` column is present; unknown headers are
/// ignored.
pub fn read_power_quality_from<R: Read>(reader: R, path: &Path, date: NaiveDate) -> Result<Table, ParseError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ParseError::HeaderReadError {
            path: path.to_path_buf(),
            source: e,
        })?
        .iter()
        .map(normalize_header)
        .collect();
    let time_idx = headers
        .iter()
        .position(|h| h == TIME_COLUMN)
        .ok_or_else(|| ParseError::MissingColumn {
            path: path.to_path_buf(),
            column: "Time".to_string(),
        })?;

    let columns = de_columns();
    let indices: Vec<Option<usize>> = columns
        .iter()
        .map(|c| headers.iter().position(|h| h == c))
        .collect();

    let mut raw_times = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); columns.len()];
    for result in rdr.records() {
        let record = result.map_err(|e| ParseError::CsvError {
            path: path.to_path_buf(),
            source: e,
        })?;
        raw_times.push(record.get(time_idx).unwrap_or("").to_string());
        for (slot, idx) in values.iter_mut().zip(&indices) {
            let cell = idx.and_then(|i| record.get(i)).unwrap_or("");
            slot.push(parse_numeric_cell(cell).ok().flatten());
        }
    }

    let times = parse_times_of_day(&raw_times, path)?;
    let keep: Vec<usize> = (0..times.len()).filter(|&i| times[i].is_some()).collect();
    let mut table = Table::new(keep.iter().filter_map(|&i| times[i]).map(|t| date.and_time(t)).collect());
    for (name, column) in columns.iter().zip(values) {
        let kept: Vec<Option<f64>> = keep.iter().map(|&i| column[i]).collect();
        table.add_numeric(name, kept).map_err(|e| ParseError::InvalidTable {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    if keep.len() < raw_times.len() {
        debug!(
            "{}: {} rows with unparsable time dropped",
            path.display(),
            raw_times.len() - keep.len()
        );
    }

    let slots = range_slots(
        date.and_time(NaiveTime::MIN),
        date.and_hms_opt(23, 45, 0).unwrap_or_default(),
        DE_INTERVAL_MINUTES,
    );
    reindex_exact(&table, &slots).map_err(|e| ParseError::InvalidTable {
        path: path.to_path_buf(),
        source: e,
    })
}

/// chrono has no minutes-with-fraction layout, so the digits after the dot
/// are checked and dropped before parsing `%H:%M`.
fn parse_time_of_day(value: &str, format: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if format == MINUTES_FRACTION {
        let (hours_minutes, fraction) = value.split_once('.')?;
        if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        return NaiveTime::parse_from_str(hours_minutes, "%H:%M").ok();
    }
    NaiveTime::parse_from_str(value, format).ok()
}

/// The first format that parses any row is used for the whole file.
fn parse_times_of_day(raw: &[String], path: &Path) -> Result<Vec<Option<NaiveTime>>, ParseError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    for format in TIME_OF_DAY_FORMATS {
        let parsed: Vec<Option<NaiveTime>> = raw
            .iter()
            .map(|v| parse_time_of_day(v, format))
            .collect();
        if parsed.iter().any(Option::is_some) {
            return Ok(parsed);
        }
    }
    Err(ParseError::TimestampParseError {
        path: path.to_path_buf(),
        row: 2,
        value: raw[0].clone(),
        format: TIME_OF_DAY_FORMATS.join(" | "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Time"), "time");
        assert_eq!(
            normalize_header("Voltage LineToNeutralAverage (RMS)"),
            "voltage_line_to_neutral_average_rms"
        );
        assert_eq!(normalize_header("Current NG (RMS) (RMS)"), "current_ng_rms_rms");
        assert_eq!(normalize_header("Power Total (P)"), "power_total_p");
        assert_eq!(de_columns().len(), 26);
    }

    #[test]
    fn test_date_from_file_name() {
        assert_eq!(
            date_from_file_name(Path::new("/x/20240612_site.csv")),
            NaiveDate::from_ymd_opt(2024, 6, 12)
        );
        assert_eq!(date_from_file_name(Path::new("site_20240612.csv")), None);
    }

    #[test]
    fn test_read_reindexes_to_quarter_hours() {
        let data = "Time,Power Total (P),Voltage AN (RMS),Vendor Extra\n\
                    00:15.000,12.5,480.1,9\n\
                    00:45.000,-1,,9\n";
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let table = read_power_quality_from(data.as_bytes(), Path::new("20240612.csv"), date).unwrap();
        assert_eq!(table.len(), 96);
        assert_eq!(table.columns().len(), 26);
        assert!(!table.has_column("vendor_extra"));
        let power = table.numeric("power_total_p").unwrap();
        assert_eq!(power[1], Some(12.5));
        // Raw meter files carry no sentinel.
        assert_eq!(power[3], Some(-1.0));
        assert_eq!(power[0], None);
        assert_eq!(table.numeric("current_bn_rms").unwrap()[1], None);
    }

    #[test]
    fn test_time_of_day_layouts() {
        let t = |h, m, s| NaiveTime::from_hms_opt(h, m, s);
        assert_eq!(parse_time_of_day("00:15.000", MINUTES_FRACTION), t(0, 15, 0));
        assert_eq!(parse_time_of_day("23:45.0", MINUTES_FRACTION), t(23, 45, 0));
        assert_eq!(parse_time_of_day("12:30:00.000", MINUTES_FRACTION), None);
        assert_eq!(parse_time_of_day("00:15", MINUTES_FRACTION), None);
        assert_eq!(parse_time_of_day("12:30:15", "%H:%M:%S"), t(12, 30, 15));
    }

    #[test]
    fn test_seconds_layout_file() {
        let data = "Time,Power Total (P)\n00:30:00,7\n01:00:00,8\n";
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let table = read_power_quality_from(data.as_bytes(), Path::new("20240612.csv"), date).unwrap();
        let power = table.numeric("power_total_p").unwrap();
        assert_eq!(power[2], Some(7.0));
        assert_eq!(power[4], Some(8.0));
    }

    #[test]
    fn test_missing_time_column_is_error() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let result = read_power_quality_from("A,B\n1,2\n".as_bytes(), Path::new("20240612.csv"), date);
        assert!(matches!(result, Err(ParseError::MissingColumn { .. })));
    }
}

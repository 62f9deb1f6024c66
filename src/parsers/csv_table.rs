use crate::errors::ParseError;
use crate::table::{ColumnData, Table, TIME_COLUMN, TIME_FORMAT};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use log::warn;
use std::io::{Read, Write};
use std::num::ParseFloatError;
use std::path::Path;

/// Storage encoding of an absent numeric cell.
pub const SENTINEL: f64 = -1.0;

const TIME_FORMATS: &[&str] = &[
    TIME_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone)]
pub struct CsvTableOptions<'a> {
    /// Header names accepted for the time key, matched case-insensitively.
    pub time_columns: &'a [&'a str],
    /// Column kept as text and used as the row identifier.
    pub identifier: Option<&'a str>,
    /// Lines to skip before the header row.
    pub skip_lines: usize,
    /// Read `-1` as absent. Only for files this crate wrote; raw source
    /// files keep `-1` as a reading.
    pub decode_sentinel: bool,
}

impl Default for CsvTableOptions<'_> {
    fn default() -> Self {
        Self {
            time_columns: &[TIME_COLUMN],
            identifier: None,
            skip_lines: 0,
            decode_sentinel: false,
        }
    }
}

impl<'a> CsvTableOptions<'a> {
    /// Options for per-day files and store tables written by [`write_table_csv`].
    pub fn stored(identifier: Option<&'a str>) -> Self {
        Self {
            identifier,
            decode_sentinel: true,
            ..CsvTableOptions::default()
        }
    }
}

pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Numeric cell decoding: empty, `nan` and `null` are absent. Thousands
/// separators are stripped.
pub fn parse_numeric_cell(raw: &str) -> Result<Option<f64>, ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return Ok(None);
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    let v = cleaned.parse::<f64>()?;
    Ok(if v.is_nan() { None } else { Some(v) })
}

/// Stored numeric value back to `Option`.
pub fn decode_sentinel(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != SENTINEL)
}

pub fn read_table_csv(path: &Path, options: &CsvTableOptions) -> Result<Table, ParseError> {
    let file = std::fs::File::open(path).map_err(|e| ParseError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_table_from(file, path, options)
}

pub fn read_table_from<R: Read>(
    reader: R,
    path: &Path,
    options: &CsvTableOptions,
) -> Result<Table, ParseError> {
    let mut buffered = std::io::BufReader::new(reader);
    for _ in 0..options.skip_lines {
        let mut discard = String::new();
        std::io::BufRead::read_line(&mut buffered, &mut discard).map_err(|e| ParseError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(buffered);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ParseError::HeaderReadError {
            path: path.to_path_buf(),
            source: e,
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let time_idx = headers
        .iter()
        .position(|h| {
            options
                .time_columns
                .iter()
                .any(|candidate| h.eq_ignore_ascii_case(candidate))
        })
        .ok_or_else(|| ParseError::MissingColumn {
            path: path.to_path_buf(),
            column: options.time_columns.join("|"),
        })?;

    // Leading pandas index columns carry no data.
    let data_columns: Vec<(usize, &String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != time_idx && !h.is_empty() && !h.starts_with("Unnamed"))
        .collect();

    let mut times = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); data_columns.len()];
    let mut skipped = 0usize;

    for (row, result) in rdr.records().enumerate() {
        let record: StringRecord = result.map_err(|e| ParseError::CsvError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let raw_time = record.get(time_idx).unwrap_or("");
        let Some(time) = parse_time(raw_time) else {
            skipped += 1;
            if skipped <= 5 {
                warn!(
                    "Skipping row {} in {}: unparsable time '{}'",
                    row + 2 + options.skip_lines,
                    path.display(),
                    raw_time
                );
            }
            continue;
        };
        times.push(time);
        for (slot, (idx, _)) in cells.iter_mut().zip(&data_columns) {
            slot.push(record.get(*idx).unwrap_or("").to_string());
        }
    }
    if skipped > 5 {
        warn!("Skipped {} rows with unparsable time in {}", skipped, path.display());
    }

    let mut table = Table::new(times);
    for ((_, name), raw) in data_columns.iter().zip(cells) {
        let force_text = options.identifier == Some(name.as_str());
        let data = infer_column(raw, force_text, options.decode_sentinel);
        let name = if table.has_column(name) {
            format!("{}_dup", name)
        } else {
            (*name).clone()
        };
        // Length always matches since cells are pushed per accepted row.
        if let Err(e) = table.add_column(crate::table::Column { name, data }) {
            warn!("Dropping column from {}: {}", path.display(), e);
        }
    }
    if let Some(id) = options.identifier {
        if table.has_column(id) {
            table.set_identifier(Some(id));
        }
    }
    Ok(table)
}

fn infer_column(raw: Vec<String>, force_text: bool, stored: bool) -> ColumnData {
    if !force_text {
        let parsed: Result<Vec<Option<f64>>, _> = raw.iter().map(|c| parse_numeric_cell(c)).collect();
        if let Ok(values) = parsed {
            return ColumnData::Numeric(if stored {
                values.into_iter().map(decode_sentinel).collect()
            } else {
                values
            });
        }
    }
    ColumnData::Text(
        raw.into_iter()
            .map(|c| {
                let trimmed = c.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect(),
    )
}

pub fn write_table_csv(path: &Path, table: &Table) -> Result<(), ParseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ParseError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let file = std::fs::File::create(path).map_err(|e| ParseError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_table_to(file, path, table)
}

pub fn write_table_to<W: Write>(writer: W, path: &Path, table: &Table) -> Result<(), ParseError> {
    let csv_err = |e: csv::Error| ParseError::CsvError {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = WriterBuilder::new().from_writer(writer);

    let mut header = vec![TIME_COLUMN.to_string()];
    header.extend(table.column_names().into_iter().map(str::to_string));
    wtr.write_record(&header).map_err(csv_err)?;

    for row in 0..table.len() {
        let mut record = Vec::with_capacity(header.len());
        record.push(table.time()[row].format(TIME_FORMAT).to_string());
        for column in table.columns() {
            record.push(encode_cell(&column.data, row));
        }
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| ParseError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn encode_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Numeric(v) => crate::table::format_number(v[row].unwrap_or(SENTINEL)),
        ColumnData::Text(v) => v[row].clone().unwrap_or_default(),
    }
}

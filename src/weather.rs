//! Weather station records: hourly normalization and severity scoring.

use crate::errors::TableError;
use crate::resample::{aggregate_by, range_slots, reindex_exact, round_to_hour};
use crate::schema::{WEATHER_COLUMNS, WEATHER_CONDITION_COLUMN, WEATHER_SCORE_COLUMN};
use crate::table::{format_number, ColumnData, Table};
use chrono::NaiveDate;

pub const UNKNOWN_CONDITION: &str = "UNKNOWN";

const SEVERE_CONDITIONS: &[&str] = &["Haze", "Thunder", "Storm", "Heavy", "Drizzle", "T-storm", "T-Storm"];
const MILD_CONDITIONS: &[&str] = &["Cloudy", "Rain", "Fog", "Smoke", "Mist"];

const SEVERE_POINTS: u32 = 10;
const MILD_POINTS: u32 = 5;

/// Sum of token points of a `/`-separated condition string.
pub fn weather_score(condition: &str) -> u32 {
    condition
        .split('/')
        .map(str::trim)
        .map(|token| {
            if SEVERE_CONDITIONS.contains(&token) {
                SEVERE_POINTS
            } else if MILD_CONDITIONS.contains(&token) {
                MILD_POINTS
            } else {
                0
            }
        })
        .sum()
}

/// Fill missing conditions with `UNKNOWN` and append `weather_score`.
/// Rerunning replaces the score column rather than adding another.
pub fn add_weather_score(table: &mut Table) -> Result<(), TableError> {
    table.ensure_text(WEATHER_CONDITION_COLUMN);
    let conditions = table.text_mut(WEATHER_CONDITION_COLUMN)?;
    for c in conditions.iter_mut() {
        if c.is_none() {
            *c = Some(UNKNOWN_CONDITION.to_string());
        }
    }
    let scores: Vec<Option<f64>> = conditions
        .iter()
        .map(|c| Some(weather_score(c.as_deref().unwrap_or(UNKNOWN_CONDITION)) as f64))
        .collect();

    table.remove_column(WEATHER_SCORE_COLUMN);
    table.add_numeric(WEATHER_SCORE_COLUMN, scores)
}

/// Hourly weather table for `[start, end]`: times rounded to the nearest
/// hour, numeric readings averaged and the most frequent condition kept per
/// hour, then reindexed onto every hour 00:00..23:00 of the range. Hours
/// without a reading keep absent numbers and an `UNKNOWN` condition.
pub fn normalize_hourly(raw: &Table, start: NaiveDate, end: NaiveDate) -> Result<Table, TableError> {
    let mut projected = Table::new(raw.time().to_vec());
    for name in WEATHER_COLUMNS {
        let data = match raw.column(name) {
            Some(ColumnData::Numeric(v)) if *name == WEATHER_CONDITION_COLUMN => {
                ColumnData::Text(v.iter().map(|x| x.map(format_number)).collect())
            }
            Some(data) => data.clone(),
            None if *name == WEATHER_CONDITION_COLUMN => ColumnData::Text(vec![None; raw.len()]),
            None => ColumnData::Numeric(vec![None; raw.len()]),
        };
        projected.add_column(crate::table::Column {
            name: name.to_string(),
            data,
        })?;
    }

    let hourly = aggregate_by(&projected, round_to_hour)?;
    let slots = range_slots(
        start.and_hms_opt(0, 0, 0).unwrap_or_default(),
        end.and_hms_opt(23, 0, 0).unwrap_or_default(),
        60,
    );
    let mut out = reindex_exact(&hourly, &slots)?;
    for c in out.text_mut(WEATHER_CONDITION_COLUMN)?.iter_mut() {
        if c.is_none() {
            *c = Some(UNKNOWN_CONDITION.to_string());
        }
    }
    Ok(out)
}

//! Bin, aggregate and reindex tables onto regular time axes.

use crate::errors::TableError;
use crate::table::{Column, ColumnData, Table};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use std::collections::{BTreeMap, HashMap};

/// Regular local timestamps from `start` to `end` inclusive.
pub fn range_slots(start: NaiveDateTime, end: NaiveDateTime, step_minutes: u32) -> Vec<NaiveDateTime> {
    let step = Duration::minutes(step_minutes.max(1) as i64);
    let mut slots = Vec::new();
    let mut t = start;
    while t <= end {
        slots.push(t);
        t += step;
    }
    slots
}

/// Start of the `[slot, slot + step)` bin containing `t`, counted from the
/// local midnight of its day.
pub fn floor_to_interval(t: NaiveDateTime, step_minutes: u32) -> NaiveDateTime {
    let step = step_minutes.max(1);
    let minute_of_day = t.hour() * 60 + t.minute();
    let floored = minute_of_day - minute_of_day % step;
    t.date().and_time(NaiveTime::MIN) + Duration::minutes(floored as i64)
}

/// Nearest whole hour; exact half hours go to the even hour.
pub fn round_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    let hour_start = t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t);
    let offset = t - hour_start;
    let half = Duration::minutes(30);
    let round_up = match offset.cmp(&half) {
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => t.hour() % 2 == 1,
    };
    if round_up {
        hour_start + Duration::hours(1)
    } else {
        hour_start
    }
}

/// Group rows by `key(time)` and collapse each group: numeric columns take
/// the mean of their present values, text columns the most frequent value
/// (ties go to the lexicographically smallest). Output is ordered by key.
pub fn aggregate_by<F>(table: &Table, key: F) -> Result<Table, TableError>
where
    F: Fn(NaiveDateTime) -> NaiveDateTime,
{
    let mut groups: BTreeMap<NaiveDateTime, Vec<usize>> = BTreeMap::new();
    for (i, t) in table.time().iter().enumerate() {
        groups.entry(key(*t)).or_default().push(i);
    }

    let mut out = Table::new(groups.keys().copied().collect());
    for column in table.columns() {
        let data = match &column.data {
            ColumnData::Numeric(values) => {
                ColumnData::Numeric(groups.values().map(|rows| mean_of(values, rows)).collect())
            }
            ColumnData::Text(values) => {
                ColumnData::Text(groups.values().map(|rows| mode_of(values, rows)).collect())
            }
        };
        out.add_column(Column {
            name: column.name.clone(),
            data,
        })?;
    }
    out.set_identifier(table.identifier());
    Ok(out)
}

fn mean_of(values: &[Option<f64>], rows: &[usize]) -> Option<f64> {
    let present: Vec<f64> = rows.iter().filter_map(|&i| values[i]).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

fn mode_of(values: &[Option<String>], rows: &[usize]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &i in rows {
        if let Some(v) = values[i].as_deref() {
            *counts.entry(v).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(v, _)| v.to_string())
}

/// Mean of every `[slot, slot + step)` bin.
pub fn resample_mean(table: &Table, step_minutes: u32) -> Result<Table, TableError> {
    aggregate_by(table, |t| floor_to_interval(t, step_minutes))
}

/// Collapse rows sharing a timestamp into their mean.
pub fn aggregate_duplicates(table: &Table) -> Result<Table, TableError> {
    aggregate_by(table, |t| t)
}

/// One row per slot, taken from the first row whose time equals the slot
/// exactly. Slots without such a row are absent.
pub fn reindex_exact(table: &Table, slots: &[NaiveDateTime]) -> Result<Table, TableError> {
    let mut first: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(table.len());
    for (i, t) in table.time().iter().enumerate() {
        first.entry(*t).or_insert(i);
    }
    let picks: Vec<Option<usize>> = slots.iter().map(|s| first.get(s).copied()).collect();

    let mut out = Table::new(slots.to_vec());
    for column in table.columns() {
        let data = match &column.data {
            ColumnData::Numeric(v) => {
                ColumnData::Numeric(picks.iter().map(|p| p.and_then(|i| v[i])).collect())
            }
            ColumnData::Text(v) => {
                ColumnData::Text(picks.iter().map(|p| p.and_then(|i| v[i].clone())).collect())
            }
        };
        out.add_column(Column {
            name: column.name.clone(),
            data,
        })?;
    }
    out.set_identifier(table.identifier());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_round_to_hour_half_to_even() {
        assert_eq!(round_to_hour(at(10, 29, 59)), at(10, 0, 0));
        assert_eq!(round_to_hour(at(10, 30, 1)), at(11, 0, 0));
        assert_eq!(round_to_hour(at(10, 30, 0)), at(10, 0, 0));
        assert_eq!(round_to_hour(at(11, 30, 0)), at(12, 0, 0));
        assert_eq!(
            round_to_hour(at(23, 45, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resample_mean_bins() {
        let mut table = Table::new(vec![at(0, 0, 0), at(0, 1, 0), at(0, 4, 0), at(0, 5, 0)]);
        table
            .add_numeric("ghi", vec![Some(1.0), Some(2.0), None, Some(10.0)])
            .unwrap();
        let binned = resample_mean(&table, 5).unwrap();
        assert_eq!(binned.time(), &[at(0, 0, 0), at(0, 5, 0)]);
        let ghi = binned.numeric("ghi").unwrap();
        assert_relative_eq!(ghi[0].unwrap(), 1.5);
        assert_relative_eq!(ghi[1].unwrap(), 10.0);
    }

    #[test]
    fn test_text_mode_breaks_ties_lexicographically() {
        let mut table = Table::new(vec![at(1, 0, 0); 4]);
        table
            .add_text(
                "weather_condition",
                vec![Some("Rain".into()), Some("Fair".into()), None, Some("Rain".into())],
            )
            .unwrap();
        let agg = aggregate_duplicates(&table).unwrap();
        assert_eq!(agg.text("weather_condition").unwrap(), &[Some("Rain".to_string())]);

        let mut tied = Table::new(vec![at(1, 0, 0); 2]);
        tied.add_text("c", vec![Some("Rain".into()), Some("Fair".into())])
            .unwrap();
        assert_eq!(
            aggregate_duplicates(&tied).unwrap().text("c").unwrap(),
            &[Some("Fair".to_string())]
        );
    }

    #[test]
    fn test_aggregate_keeps_every_column_and_identifier() {
        let mut table = Table::new(vec![at(2, 0, 0), at(2, 0, 0), at(3, 0, 0)]);
        table
            .add_text("device_id", vec![Some("29".into()), Some("29".into()), Some("30".into())])
            .unwrap();
        table
            .add_numeric("ac_power", vec![Some(4.0), Some(6.0), None])
            .unwrap();
        table.set_identifier(Some("device_id"));

        let agg = aggregate_duplicates(&table).unwrap();
        assert_eq!(agg.column_names(), vec!["device_id", "ac_power"]);
        assert_eq!(agg.identifier(), Some("device_id"));
        assert_eq!(agg.numeric("ac_power").unwrap(), &[Some(5.0), None]);

        let out = reindex_exact(&agg, &range_slots(at(1, 0, 0), at(3, 0, 0), 60)).unwrap();
        assert_eq!(out.identifier(), Some("device_id"));
        assert_eq!(
            out.text("device_id").unwrap(),
            &[None, Some("29".to_string()), Some("30".to_string())]
        );
    }

    #[test]
    fn test_reindex_exact_fills_gaps() {
        let mut table = Table::new(vec![at(0, 1, 0), at(0, 0, 30), at(0, 2, 0)]);
        table
            .add_numeric("v", vec![Some(1.0), Some(9.0), Some(2.0)])
            .unwrap();
        let slots = range_slots(at(0, 0, 0), at(0, 3, 0), 1);
        let out = reindex_exact(&table, &slots).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.numeric("v").unwrap(), &[None, Some(1.0), Some(2.0), None]);
    }
}

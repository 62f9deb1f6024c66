//! In-memory time-keyed table used by every fusion, cleaning and storage step.
//!
//! Absent values are `None`. The `-1` sentinel only exists at the CSV and
//! database boundary.

use crate::errors::TableError;
use crate::metrics::METRICS;
use chrono::NaiveDateTime;
use log::warn;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const TIME_COLUMN: &str = "time";
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    fn empty_like(&self) -> Self {
        match self {
            ColumnData::Numeric(_) => ColumnData::Numeric(Vec::new()),
            ColumnData::Text(_) => ColumnData::Text(Vec::new()),
        }
    }

    fn absent_like(&self, len: usize) -> Self {
        match self {
            ColumnData::Numeric(_) => ColumnData::Numeric(vec![None; len]),
            ColumnData::Text(_) => ColumnData::Text(vec![None; len]),
        }
    }

    /// Rows picked by index; `None` produces an absent cell.
    fn gather(&self, rows: &[Option<usize>]) -> Self {
        match self {
            ColumnData::Numeric(v) => {
                ColumnData::Numeric(rows.iter().map(|r| r.and_then(|i| v[i])).collect())
            }
            ColumnData::Text(v) => {
                ColumnData::Text(rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect())
            }
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn append(&mut self, other: &ColumnData, name: &str) -> Result<(), TableError> {
        // A numeric column meeting text (e.g. a day where every condition
        // was empty) widens to text.
        if let (ColumnData::Numeric(a), ColumnData::Text(_)) = (&*self, other) {
            *self = ColumnData::Text(a.iter().map(|v| v.map(format_number)).collect());
        }
        match (self, other) {
            (ColumnData::Numeric(a), ColumnData::Numeric(b)) => a.extend_from_slice(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b.iter().cloned()),
            (ColumnData::Text(a), ColumnData::Numeric(b)) => {
                a.extend(b.iter().map(|v| v.map(format_number)))
            }
            (ColumnData::Numeric(_), ColumnData::Text(_)) => {
                return Err(TableError::NotNumeric(name.to_string()))
            }
        }
        Ok(())
    }

    fn extend_absent(&mut self, count: usize) {
        match self {
            ColumnData::Numeric(v) => v.extend(std::iter::repeat(None).take(count)),
            ColumnData::Text(v) => v.extend(std::iter::repeat(None).take(count)),
        }
    }

    /// Cell rendered as a join key. Whole numbers lose their fraction so a
    /// numeric `29` matches a textual `"29"`.
    pub fn key_at(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Numeric(v) => v[row].map(format_number),
            ColumnData::Text(v) => v[row].as_ref().map(|s| s.trim().to_string()),
        }
    }
}

pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOn {
    Time,
    TimeAndIdentifier,
}

type RowKey = (NaiveDateTime, Option<String>);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    time: Vec<NaiveDateTime>,
    columns: Vec<Column>,
    identifier: Option<String>,
}

impl Table {
    pub fn new(time: Vec<NaiveDateTime>) -> Self {
        Self {
            time,
            columns: Vec::new(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, name: &str) -> Self {
        self.identifier = Some(name.to_string());
        self
    }

    pub fn set_identifier(&mut self, name: Option<&str>) {
        self.identifier = name.map(str::to_string);
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[NaiveDateTime] {
        &self.time
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn add_column(&mut self, column: Column) -> Result<(), TableError> {
        if column.name == TIME_COLUMN || self.has_column(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        if column.data.len() != self.len() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.len(),
                actual: column.data.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn add_numeric(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), TableError> {
        self.add_column(Column {
            name: name.to_string(),
            data: ColumnData::Numeric(values),
        })
    }

    pub fn add_text(&mut self, name: &str, values: Vec<Option<String>>) -> Result<(), TableError> {
        self.add_column(Column {
            name: name.to_string(),
            data: ColumnData::Text(values),
        })
    }

    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        match self.column(name) {
            Some(ColumnData::Numeric(v)) => Ok(v),
            Some(ColumnData::Text(_)) => Err(TableError::NotNumeric(name.to_string())),
            None => Err(TableError::ColumnNotFound(name.to_string())),
        }
    }

    pub fn numeric_mut(&mut self, name: &str) -> Result<&mut Vec<Option<f64>>, TableError> {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(Column {
                data: ColumnData::Numeric(v),
                ..
            }) => Ok(v),
            Some(_) => Err(TableError::NotNumeric(name.to_string())),
            None => Err(TableError::ColumnNotFound(name.to_string())),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[Option<String>], TableError> {
        match self.column(name) {
            Some(ColumnData::Text(v)) => Ok(v),
            Some(ColumnData::Numeric(_)) => Err(TableError::NotText(name.to_string())),
            None => Err(TableError::ColumnNotFound(name.to_string())),
        }
    }

    pub fn text_mut(&mut self, name: &str) -> Result<&mut Vec<Option<String>>, TableError> {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(Column {
                data: ColumnData::Text(v),
                ..
            }) => Ok(v),
            Some(_) => Err(TableError::NotText(name.to_string())),
            None => Err(TableError::ColumnNotFound(name.to_string())),
        }
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        if self.identifier.as_deref() == Some(name) {
            self.identifier = None;
        }
        Some(self.columns.remove(idx))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| TableError::ColumnNotFound(from.to_string()))?;
        column.name = to.to_string();
        if self.identifier.as_deref() == Some(from) {
            self.identifier = Some(to.to_string());
        }
        Ok(())
    }

    /// Add an all-absent numeric column when `name` is missing. Returns
    /// whether a column was synthesized.
    pub fn ensure_numeric(&mut self, name: &str) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.columns.push(Column {
            name: name.to_string(),
            data: ColumnData::Numeric(vec![None; self.len()]),
        });
        true
    }

    /// Make `name` a text column: numeric cells are rendered, a missing
    /// column is added fully absent.
    pub fn ensure_text(&mut self, name: &str) {
        let len = self.len();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => {
                if let ColumnData::Numeric(v) = &column.data {
                    column.data = ColumnData::Text(v.iter().map(|x| x.map(format_number)).collect());
                }
            }
            None => self.columns.push(Column {
                name: name.to_string(),
                data: ColumnData::Text(vec![None; len]),
            }),
        }
    }

    /// Project onto `names` in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Table, TableError> {
        let mut out = Table::new(self.time.clone());
        for name in names {
            let data = self
                .column(name)
                .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
            out.columns.push(Column {
                name: name.to_string(),
                data: data.clone(),
            });
        }
        if let Some(id) = self.identifier.as_deref() {
            if names.contains(&id) {
                out.identifier = Some(id.to_string());
            }
        }
        Ok(out)
    }

    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            time: rows.iter().map(|&i| self.time[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(rows),
                })
                .collect(),
            identifier: self.identifier.clone(),
        }
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.take_rows(&rows)
    }

    /// Rows whose time falls in `[start, end]`.
    pub fn filter_time_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Table {
        self.filter_rows(|i| self.time[i] >= start && self.time[i] <= end)
    }

    /// Identifier cell of every row, rendered as a key.
    pub fn identifier_keys(&self) -> Vec<Option<String>> {
        match self.identifier.as_deref().and_then(|id| self.column(id)) {
            Some(data) => (0..self.len()).map(|i| data.key_at(i)).collect(),
            None => vec![None; self.len()],
        }
    }

    /// Distinct identifier keys, ordered numerically where possible.
    pub fn distinct_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .identifier_keys()
            .into_iter()
            .flatten()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_by(|a, b| compare_identifiers(a, b));
        ids
    }

    pub fn sort_by_time(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.time[i]);
        *self = self.take_rows(&order);
    }

    pub fn sort_by_time_and_identifier(&mut self) {
        let keys = self.identifier_keys();
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            self.time[a]
                .cmp(&self.time[b])
                .then_with(|| match (&keys[a], &keys[b]) {
                    (Some(x), Some(y)) => compare_identifiers(x, y),
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                })
        });
        *self = self.take_rows(&order);
    }

    fn row_keys(&self, on: JoinOn) -> Result<Vec<RowKey>, TableError> {
        match on {
            JoinOn::Time => Ok(self.time.iter().map(|t| (*t, None)).collect()),
            JoinOn::TimeAndIdentifier => {
                let id = self
                    .identifier
                    .as_deref()
                    .ok_or_else(|| TableError::ColumnNotFound("identifier".to_string()))?;
                if !self.has_column(id) {
                    return Err(TableError::ColumnNotFound(id.to_string()));
                }
                Ok(self.time.iter().copied().zip(self.identifier_keys()).collect())
            }
        }
    }

    /// Stable sort by time, then keep the first row of every key. Returns the
    /// deduplicated table and the number of rows dropped.
    pub fn dedup_keep_first(&self, on: JoinOn) -> Result<(Table, usize), TableError> {
        let mut sorted = self.clone();
        sorted.sort_by_time();
        let keys = sorted.row_keys(on)?;
        let mut seen: HashSet<&RowKey> = HashSet::with_capacity(keys.len());
        let keep: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(_, key)| seen.insert(*key))
            .map(|(i, _)| i)
            .collect();
        let dropped = sorted.len() - keep.len();
        Ok((sorted.take_rows(&keep), dropped))
    }

    /// Key that identifies a row on its own: time plus identifier when the
    /// table carries one.
    pub fn natural_key(&self) -> JoinOn {
        match self.identifier.as_deref() {
            Some(id) if self.has_column(id) => JoinOn::TimeAndIdentifier,
            _ => JoinOn::Time,
        }
    }

    /// Full outer join. The left side is deduplicated on its natural key and
    /// the right side on the join key (keep-first, logged), so a left table
    /// with several devices per timestamp can pick up one right row per
    /// timestamp. A right identifier column named like the left one is
    /// folded into it; any other clashing right column is renamed with
    /// `suffix`. The result is stably sorted by time.
    pub fn outer_join(&self, right: &Table, on: JoinOn, suffix: &str) -> Result<Table, TableError> {
        let (left, left_dropped) = self.dedup_keep_first(self.natural_key())?;
        let (right, right_dropped) = right.dedup_keep_first(on)?;
        if left_dropped + right_dropped > 0 {
            warn!(
                "Ambiguous join keys resolved keep-first: {} left and {} right rows dropped",
                left_dropped, right_dropped
            );
            METRICS
                .lock()
                .record_join_ambiguities((left_dropped + right_dropped) as u64);
        }

        let left_keys = left.row_keys(on)?;
        let right_keys = right.row_keys(on)?;
        let right_index: HashMap<&RowKey, usize> =
            right_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

        let mut left_rows: Vec<Option<usize>> = Vec::with_capacity(left.len() + right.len());
        let mut right_rows: Vec<Option<usize>> = Vec::with_capacity(left.len() + right.len());
        let mut matched = vec![false; right.len()];
        for (i, key) in left_keys.iter().enumerate() {
            let r = right_index.get(key).copied();
            if let Some(r) = r {
                matched[r] = true;
            }
            left_rows.push(Some(i));
            right_rows.push(r);
        }
        for (r, was_matched) in matched.iter().enumerate() {
            if !was_matched {
                left_rows.push(None);
                right_rows.push(Some(r));
            }
        }

        let time: Vec<NaiveDateTime> = left_rows
            .iter()
            .zip(&right_rows)
            .map(|(l, r)| match (l, r) {
                (Some(l), _) => left.time[*l],
                (None, Some(r)) => right.time[*r],
                (None, None) => unreachable!("every joined row has a source"),
            })
            .collect();

        let mut out = Table::new(time);
        out.identifier = left.identifier.clone();
        for column in &left.columns {
            out.columns.push(Column {
                name: column.name.clone(),
                data: column.data.gather(&left_rows),
            });
        }

        let shared_identifier = match (left.identifier.as_deref(), right.identifier.as_deref()) {
            (Some(l), Some(r)) if l == r => Some(l.to_string()),
            _ => None,
        };

        for column in &right.columns {
            let gathered = column.data.gather(&right_rows);
            if shared_identifier.as_deref() == Some(column.name.as_str()) {
                if let Some(existing) = out.columns.iter_mut().find(|c| c.name == column.name) {
                    fold_missing(&mut existing.data, &gathered);
                    continue;
                }
            }
            let mut name = column.name.clone();
            while out.has_column(&name) {
                name.push_str(suffix);
            }
            out.columns.push(Column { name, data: gathered });
        }

        if out.identifier.is_none() {
            out.identifier = right.identifier.clone().filter(|id| out.has_column(id));
        }

        out.sort_by_time();
        Ok(out)
    }

    /// Stack tables vertically. The schema is the union of column names in
    /// first-seen order; rows missing a column get absent cells.
    pub fn concat_rows(tables: &[Table]) -> Result<Table, TableError> {
        let mut out = Table::default();
        for table in tables {
            let before = out.len();
            out.time.extend_from_slice(&table.time);
            for column in &table.columns {
                if !out.has_column(&column.name) {
                    out.columns.push(Column {
                        name: column.name.clone(),
                        data: column.data.absent_like(before),
                    });
                }
            }
            for existing in out.columns.iter_mut() {
                match table.column(&existing.name) {
                    Some(data) => existing.data.append(data, &existing.name)?,
                    None => existing.data.extend_absent(table.len()),
                }
            }
            if out.identifier.is_none() {
                out.identifier = table.identifier.clone();
            }
        }
        Ok(out)
    }

    /// Empty table with the same schema.
    pub fn empty_like(&self) -> Table {
        Table {
            time: Vec::new(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.empty_like(),
                })
                .collect(),
            identifier: self.identifier.clone(),
        }
    }
}

fn fold_missing(target: &mut ColumnData, source: &ColumnData) {
    match (target, source) {
        (ColumnData::Numeric(t), ColumnData::Numeric(s)) => {
            for (dst, src) in t.iter_mut().zip(s) {
                if dst.is_none() {
                    *dst = *src;
                }
            }
        }
        (ColumnData::Text(t), ColumnData::Text(s)) => {
            for (dst, src) in t.iter_mut().zip(s) {
                if dst.is_none() {
                    *dst = src.clone();
                }
            }
        }
        (ColumnData::Text(t), ColumnData::Numeric(s)) => {
            for (dst, src) in t.iter_mut().zip(s) {
                if dst.is_none() {
                    *dst = src.map(format_number);
                }
            }
        }
        (ColumnData::Numeric(t), ColumnData::Text(s)) => {
            for (dst, src) in t.iter_mut().zip(s) {
                if dst.is_none() {
                    *dst = src.as_deref().and_then(|v| v.trim().parse().ok());
                }
            }
        }
    }
}

pub fn compare_identifiers(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 12)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn table(times: &[(u32, u32)], name: &str, values: &[Option<f64>]) -> Table {
        let mut table = Table::new(times.iter().map(|&(h, m)| t(h, m)).collect());
        table.add_numeric(name, values.to_vec()).unwrap();
        table
    }

    #[test]
    fn test_add_column_checks_length() {
        let mut table = Table::new(vec![t(0, 0), t(0, 5)]);
        let err = table.add_numeric("x", vec![Some(1.0)]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { .. }));
        table.add_numeric("x", vec![Some(1.0), None]).unwrap();
        assert_eq!(
            table.add_numeric("x", vec![None, None]).unwrap_err(),
            TableError::DuplicateColumn("x".to_string())
        );
    }

    #[test]
    fn test_dedup_keep_first_after_stable_sort() {
        let table = table(&[(0, 10), (0, 5), (0, 10)], "x", &[Some(1.0), Some(2.0), Some(3.0)]);
        let (deduped, dropped) = table.dedup_keep_first(JoinOn::Time).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(deduped.time(), &[t(0, 5), t(0, 10)]);
        assert_eq!(deduped.numeric("x").unwrap(), &[Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_outer_join_on_time() {
        let left = table(&[(0, 0), (0, 5)], "a", &[Some(1.0), Some(2.0)]);
        let right = table(&[(0, 5), (0, 10)], "b", &[Some(20.0), Some(30.0)]);
        let joined = left.outer_join(&right, JoinOn::Time, "_right").unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.numeric("a").unwrap(), &[Some(1.0), Some(2.0), None]);
        assert_eq!(joined.numeric("b").unwrap(), &[None, Some(20.0), Some(30.0)]);
    }

    #[test]
    fn test_outer_join_suffixes_clashing_columns() {
        let left = table(&[(0, 0)], "x", &[Some(1.0)]);
        let right = table(&[(0, 0)], "x", &[Some(2.0)]);
        let joined = left.outer_join(&right, JoinOn::Time, "_env").unwrap();
        assert_eq!(joined.column_names(), vec!["x", "x_env"]);
    }

    #[test]
    fn test_outer_join_on_identifier_folds_id_column() {
        let mut left = Table::new(vec![t(0, 0), t(0, 0)]).with_identifier("device_id");
        left.add_numeric("a", vec![Some(1.0), Some(2.0)]).unwrap();
        left.add_text("device_id", vec![Some("1".into()), Some("29".into())])
            .unwrap();
        let mut right = Table::new(vec![t(0, 0), t(0, 5)]).with_identifier("device_id");
        right.add_numeric("b", vec![Some(9.0), Some(8.0)]).unwrap();
        right.add_numeric("device_id", vec![Some(29.0), Some(29.0)]).unwrap();

        let joined = left.outer_join(&right, JoinOn::TimeAndIdentifier, "_r").unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.column_names(), vec!["a", "device_id", "b"]);
        assert_eq!(joined.numeric("b").unwrap(), &[None, Some(9.0), Some(8.0)]);
        assert_eq!(
            joined.text("device_id").unwrap(),
            &[Some("1".to_string()), Some("29".to_string()), Some("29".to_string())]
        );
    }

    #[test]
    fn test_outer_join_many_devices_to_one_time_row() {
        let mut left = Table::new(vec![t(0, 0), t(0, 0)]).with_identifier("device_id");
        left.add_text("device_id", vec![Some("1".into()), Some("2".into())])
            .unwrap();
        let right = table(&[(0, 0), (0, 5)], "ir", &[Some(400.0), Some(410.0)]);
        let joined = left.outer_join(&right, JoinOn::Time, "_r").unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.numeric("ir").unwrap(), &[Some(400.0), Some(400.0), Some(410.0)]);
        assert_eq!(joined.identifier_keys()[2], None);
    }

    #[test]
    fn test_concat_rows_unions_schema() {
        let a = table(&[(0, 0)], "x", &[Some(1.0)]);
        let b = table(&[(0, 5)], "y", &[Some(2.0)]);
        let stacked = Table::concat_rows(&[a, b]).unwrap();
        assert_eq!(stacked.len(), 2);
        assert_eq!(stacked.numeric("x").unwrap(), &[Some(1.0), None]);
        assert_eq!(stacked.numeric("y").unwrap(), &[None, Some(2.0)]);
    }

    #[test]
    fn test_ensure_numeric_synthesizes_absent() {
        let mut table = table(&[(0, 0), (0, 5)], "x", &[Some(1.0), Some(2.0)]);
        assert!(table.ensure_numeric("missing"));
        assert!(!table.ensure_numeric("x"));
        assert_eq!(table.numeric("missing").unwrap(), &[None, None]);
    }

    #[test]
    fn test_identifier_ordering_is_numeric() {
        assert_eq!(compare_identifiers("2", "10"), Ordering::Less);
        assert_eq!(compare_identifiers("ir", "10"), Ordering::Greater);
    }
}

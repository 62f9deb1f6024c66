//! Rule-based cleaning. Every rule here is idempotent: running it on its own
//! output changes nothing.

use crate::climatology::{Bounds, ReferenceBounds};
use crate::errors::TableError;
use crate::metrics::METRICS;
use crate::table::Table;
use log::debug;
use std::collections::HashMap;

/// Fields zeroed when the inverter reports no AC power.
const OFF_STATE_FIELDS: &[&str] = &["ir", "dc_power_a", "dc_power_b"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub zero_filled: usize,
    pub neighbour_filled: usize,
    pub default_filled: usize,
    pub bounds_violations: usize,
    pub off_state_forced: usize,
}

impl CleaningReport {
    fn absorb(&mut self, other: CleaningReport) {
        self.zero_filled += other.zero_filled;
        self.neighbour_filled += other.neighbour_filled;
        self.default_filled += other.default_filled;
        self.bounds_violations += other.bounds_violations;
        self.off_state_forced += other.off_state_forced;
    }
}

/// GHI-conditioned imputation of one series.
///
/// An absent value becomes 0 when GHI is 0 at that slot. When GHI is
/// positive it is filled from the nearest earlier present value, else the
/// nearest later one, else 0. Slots whose GHI is absent or negative stay
/// absent and never serve as fill sources.
pub fn impute_series(values: &mut [Option<f64>], ghi: &[Option<f64>]) -> CleaningReport {
    let mut report = CleaningReport::default();
    let mut targets = Vec::new();

    for (i, value) in values.iter_mut().enumerate() {
        if value.is_some() {
            continue;
        }
        match ghi.get(i).copied().flatten() {
            Some(g) if g == 0.0 => {
                *value = Some(0.0);
                report.zero_filled += 1;
            }
            Some(g) if g > 0.0 => targets.push(i),
            _ => {}
        }
    }
    if targets.is_empty() {
        return report;
    }

    let snapshot: Vec<Option<f64>> = values.to_vec();
    let mut previous: Vec<Option<f64>> = vec![None; snapshot.len()];
    let mut last = None;
    for (i, v) in snapshot.iter().enumerate() {
        previous[i] = last;
        if v.is_some() {
            last = *v;
        }
    }
    let mut next: Vec<Option<f64>> = vec![None; snapshot.len()];
    let mut upcoming = None;
    for (i, v) in snapshot.iter().enumerate().rev() {
        next[i] = upcoming;
        if v.is_some() {
            upcoming = *v;
        }
    }

    for i in targets {
        match previous[i].or(next[i]) {
            Some(v) => {
                values[i] = Some(v);
                report.neighbour_filled += 1;
            }
            None => {
                values[i] = Some(0.0);
                report.default_filled += 1;
            }
        }
    }
    report
}

/// Apply [`impute_series`] to each of `fields`, conditioned on `ghi_column`
/// at the same row. Missing fields are ignored.
pub fn impute_with_ghi(
    table: &mut Table,
    ghi_column: &str,
    fields: &[&str],
) -> Result<CleaningReport, TableError> {
    let ghi = table.numeric(ghi_column)?.to_vec();
    let mut report = CleaningReport::default();
    for field in fields {
        if !table.has_column(field) {
            continue;
        }
        let values = table.numeric_mut(field)?;
        report.absorb(impute_series(values, &ghi));
    }
    Ok(report)
}

/// Replace present values outside `bounds` with the last in-bounds reading
/// (absent when there is none yet). Absent values are left alone.
pub fn reject_out_of_bounds(values: &mut [Option<f64>], rows: &[usize], bounds: Bounds) -> usize {
    let mut violations = 0;
    let mut last_valid = None;
    for &i in rows {
        if let Some(v) = values[i] {
            if bounds.contains(v) {
                last_valid = Some(v);
            } else {
                values[i] = last_valid;
                violations += 1;
            }
        }
    }
    violations
}

/// Row indices grouped by identifier, in table order. Tables without an
/// identifier form a single group.
fn identifier_groups(table: &Table) -> Vec<Vec<usize>> {
    let mut order: Vec<Option<String>> = Vec::new();
    let mut groups: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (i, key) in table.identifier_keys().into_iter().enumerate() {
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(i);
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

fn apply_bounds(table: &mut Table, field: &str, bounds: Bounds) -> Result<usize, TableError> {
    if !table.has_column(field) {
        return Ok(0);
    }
    let groups = identifier_groups(table);
    let values = table.numeric_mut(field)?;
    Ok(groups
        .iter()
        .map(|rows| reject_out_of_bounds(values, rows, bounds))
        .sum())
}

/// Where `ac_power` is absent the device is off: irradiance and DC power
/// read as 0.
pub fn force_off_state(table: &mut Table) -> Result<usize, TableError> {
    if !table.has_column("ac_power") {
        return Ok(0);
    }
    let off: Vec<usize> = table
        .numeric("ac_power")?
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_none())
        .map(|(i, _)| i)
        .collect();
    let mut forced = 0;
    for field in OFF_STATE_FIELDS {
        if !table.has_column(field) {
            continue;
        }
        let values = table.numeric_mut(field)?;
        for &i in &off {
            if values[i] != Some(0.0) {
                values[i] = Some(0.0);
                forced += 1;
            }
        }
    }
    Ok(forced)
}

/// Site record cleaning: off-state zeroing, then reference-bound rejection
/// of irradiance, ambient temperature and humidity per inverter.
pub fn clean_sp(table: &mut Table, bounds: &ReferenceBounds) -> Result<CleaningReport, TableError> {
    let mut report = CleaningReport::default();
    if table.is_empty() {
        return Ok(report);
    }
    report.off_state_forced = force_off_state(table)?;
    report.bounds_violations += apply_bounds(table, "ir", bounds.ghi)?;
    report.bounds_violations += apply_bounds(table, "ambient_temp", bounds.temperature)?;
    report.bounds_violations += apply_bounds(table, "ambient_rh", bounds.relative_humidity)?;
    record(&report);
    debug!("Site cleaning: {:?}", report);
    Ok(report)
}

/// Irradiance-sensor cleaning: GHI outside reference bounds is replaced by
/// the last valid reading.
pub fn clean_ae(table: &mut Table, bounds: &ReferenceBounds) -> Result<CleaningReport, TableError> {
    let mut report = CleaningReport::default();
    if table.is_empty() {
        return Ok(report);
    }
    report.bounds_violations = apply_bounds(table, "ghi", bounds.ghi)?;
    record(&report);
    Ok(report)
}

fn record(report: &CleaningReport) {
    let mut metrics = METRICS.lock();
    metrics.record_bounds_violations(report.bounds_violations as u64);
    metrics.record_imputed((report.zero_filled + report.neighbour_filled + report.default_filled) as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bounds() -> ReferenceBounds {
        ReferenceBounds {
            ghi: Bounds { min: 0.0, max: 1000.0 },
            temperature: Bounds { min: -20.0, max: 45.0 },
            relative_humidity: Bounds { min: 5.0, max: 100.0 },
        }
    }

    fn times(n: usize) -> Vec<chrono::NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 6, 12)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        (0..n).map(|i| start + chrono::Duration::minutes(5 * i as i64)).collect()
    }

    #[test]
    fn test_ghi_zero_turns_absent_into_zero() {
        let mut values = vec![None];
        let report = impute_series(&mut values, &[Some(0.0)]);
        assert_eq!(values, vec![Some(0.0)]);
        assert_eq!(report.zero_filled, 1);
    }

    #[test]
    fn test_ghi_positive_fills_from_neighbour() {
        let mut values = vec![Some(10.0), None, Some(20.0)];
        impute_series(&mut values, &[Some(5.0); 3]);
        assert_eq!(values, vec![Some(10.0), Some(10.0), Some(20.0)]);
    }

    #[test]
    fn test_ghi_positive_backfills_then_defaults() {
        let mut values = vec![None, None, Some(7.0)];
        impute_series(&mut values, &[Some(3.0); 3]);
        assert_eq!(values, vec![Some(7.0), Some(7.0), Some(7.0)]);

        let mut lonely = vec![None, None];
        let report = impute_series(&mut lonely, &[Some(3.0), Some(3.0)]);
        assert_eq!(lonely, vec![Some(0.0), Some(0.0)]);
        assert_eq!(report.default_filled, 2);
    }

    #[test]
    fn test_unknown_ghi_leaves_absent() {
        let mut values = vec![Some(4.0), None, None];
        impute_series(&mut values, &[Some(1.0), None, Some(-2.0)]);
        assert_eq!(values, vec![Some(4.0), None, None]);
    }

    #[test]
    fn test_absent_under_unknown_ghi_is_not_a_fill_source() {
        let mut values = vec![Some(4.0), None, None];
        impute_series(&mut values, &[Some(1.0), None, Some(2.0)]);
        assert_eq!(values, vec![Some(4.0), None, Some(4.0)]);
    }

    #[test]
    fn test_bounds_replace_with_last_valid() {
        let mut values = vec![Some(500.0), Some(1500.0), None, Some(-3.0), Some(600.0)];
        let rows: Vec<usize> = (0..values.len()).collect();
        let violations = reject_out_of_bounds(&mut values, &rows, bounds().ghi);
        assert_eq!(violations, 2);
        assert_eq!(values, vec![Some(500.0), Some(500.0), None, Some(500.0), Some(600.0)]);
    }

    #[test]
    fn test_bounds_without_prior_valid_reading() {
        let mut values = vec![Some(2000.0), Some(10.0)];
        reject_out_of_bounds(&mut values, &[0, 1], bounds().ghi);
        assert_eq!(values, vec![None, Some(10.0)]);
    }

    #[test]
    fn test_clean_sp_off_state_and_grouping() {
        let mut table = Table::new(times(2).into_iter().flat_map(|t| [t, t]).collect())
            .with_identifier("inverter_no");
        table
            .add_numeric("ac_power", vec![Some(5.0), None, Some(5.0), Some(6.0)])
            .unwrap();
        table
            .add_numeric("ir", vec![Some(700.0), Some(650.0), Some(5000.0), Some(900.0)])
            .unwrap();
        table
            .add_numeric("dc_power_a", vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0)])
            .unwrap();
        table
            .add_text(
                "inverter_no",
                vec![Some("1".into()), Some("2".into()), Some("1".into()), Some("2".into())],
            )
            .unwrap();

        let report = clean_sp(&mut table, &bounds()).unwrap();
        assert_eq!(table.numeric("ir").unwrap(), &[Some(700.0), Some(0.0), Some(700.0), Some(900.0)]);
        assert_eq!(table.numeric("dc_power_a").unwrap()[1], Some(0.0));
        assert_eq!(report.bounds_violations, 1);
    }

    #[test]
    fn test_clean_ae_forward_fills_out_of_bounds() {
        let mut table = Table::new(times(3));
        table
            .add_numeric("ghi", vec![Some(100.0), Some(1200.0), Some(90.0)])
            .unwrap();
        clean_ae(&mut table, &bounds()).unwrap();
        assert_eq!(table.numeric("ghi").unwrap(), &[Some(100.0), Some(100.0), Some(90.0)]);
    }
}

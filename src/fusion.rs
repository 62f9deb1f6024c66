//! Cross-source fusion of per-device day records.

use crate::errors::TableError;
use crate::schema::{
    DEVICE_ID_COLUMN, ENVIRONMENTAL_SENSOR_COLUMNS, INVERTER_COLUMNS, INVERTER_NO_COLUMN,
    IRRADIANCE_COLUMNS, SITE_COLUMNS,
};
use crate::table::{ColumnData, JoinOn, Table};
use log::{debug, warn};

/// Site record field and the fused column it is taken from.
const SITE_FIELD_SOURCES: &[(&str, &str)] = &[
    ("ir", "ir"),
    ("ambient_temp", "ambient_temp2"),
    ("ambient_rh", "ambient_rh"),
    ("cap_temp", "inv_temp1"),
    ("relay_temp", "inv_temp2"),
    ("rh", "inv_rh"),
    (INVERTER_NO_COLUMN, DEVICE_ID_COLUMN),
];

/// Outer-join any number of tables on time, left to right.
pub fn fuse_on_time(tables: &[Table], suffix: &str) -> Result<Table, TableError> {
    let mut iter = tables.iter();
    let Some(first) = iter.next() else {
        return Ok(Table::default());
    };
    iter.try_fold(first.clone(), |acc, next| acc.outer_join(next, JoinOn::Time, suffix))
}

/// Environmental day record: the site irradiance record joined on time
/// with every environmental sensor record, one row per time per sensor.
/// `device_id` in the result names the sensor; the irradiance record's own
/// tag is dropped.
pub fn environmental_day(irradiance: Option<&Table>, sensors: &[Table]) -> Result<Table, TableError> {
    let irradiance = irradiance.map(|irr| {
        let mut site = irr.clone();
        site.remove_column(DEVICE_ID_COLUMN);
        site.set_identifier(None);
        site
    });
    let per_sensor: Vec<Table> = match irradiance {
        Some(irr) if sensors.is_empty() => vec![irr],
        Some(irr) => sensors
            .iter()
            .map(|sensor| irr.outer_join(sensor, JoinOn::Time, "_sensor"))
            .collect::<Result<_, _>>()?,
        None => sensors.to_vec(),
    };
    let mut merged = Table::concat_rows(&per_sensor)?;
    merged.sort_by_time_and_identifier();
    Ok(merged)
}

/// Split a stored environmental table into the site irradiance part (one
/// row per time) and the per-sensor part keyed by `device_id`.
pub fn split_environmental(environmental: &Table) -> Result<(Table, Table), TableError> {
    let irradiance_names: Vec<&str> = IRRADIANCE_COLUMNS
        .iter()
        .copied()
        .filter(|c| environmental.has_column(c))
        .collect();
    let (irradiance, dropped) = environmental
        .select(&irradiance_names)?
        .dedup_keep_first(JoinOn::Time)?;
    if dropped > 0 {
        debug!("Collapsed {} repeated irradiance rows", dropped);
    }

    let mut sensor_names: Vec<&str> = ENVIRONMENTAL_SENSOR_COLUMNS
        .iter()
        .copied()
        .filter(|c| environmental.has_column(c))
        .collect();
    let mut sensors = if environmental.has_column(DEVICE_ID_COLUMN) {
        sensor_names.push(DEVICE_ID_COLUMN);
        let mut sensors = environmental.select(&sensor_names)?;
        sensors.set_identifier(Some(DEVICE_ID_COLUMN));
        sensors
    } else {
        environmental.select(&sensor_names)?
    };
    if sensors.identifier().is_some() {
        let keys = sensors.identifier_keys();
        sensors = sensors.filter_rows(|i| keys[i].is_some());
    }
    Ok((irradiance, sensors))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteRecordReport {
    pub synthesized: Vec<String>,
    pub rows_without_inverter: usize,
}

/// Raw site record: operating rows joined with the matching environmental
/// sensor on (time, device) and with the site irradiance on time, then
/// projected onto the site schema by name. Fields with no source are
/// synthesized fully absent.
pub fn build_site_record(
    operating: &Table,
    environmental: &Table,
) -> Result<(Table, SiteRecordReport), TableError> {
    let mut report = SiteRecordReport::default();
    let (irradiance, sensors) = split_environmental(environmental)?;

    let mut fused = operating.clone();
    if fused.identifier().is_none() && fused.has_column(DEVICE_ID_COLUMN) {
        fused.set_identifier(Some(DEVICE_ID_COLUMN));
    }
    if sensors.identifier().is_some() && fused.identifier().is_some() {
        fused = fused.outer_join(&sensors, JoinOn::TimeAndIdentifier, "_env")?;
    } else if !sensors.is_empty() {
        warn!("Environmental sensor rows carry no device id; sensor fields left absent");
    }
    if !irradiance.is_empty() {
        fused = fused.outer_join(&irradiance, JoinOn::Time, "_irr")?;
    }

    let keys = fused.identifier_keys();
    let before = fused.len();
    fused = fused.filter_rows(|i| keys[i].is_some());
    report.rows_without_inverter = before - fused.len();
    if report.rows_without_inverter > 0 {
        warn!(
            "Dropped {} fused rows with no inverter",
            report.rows_without_inverter
        );
    }

    let mut site = Table::new(fused.time().to_vec());
    for name in INVERTER_COLUMNS {
        project(&fused, &mut site, name, name, &mut report)?;
    }
    for (target, source) in SITE_FIELD_SOURCES {
        project(&fused, &mut site, target, source, &mut report)?;
    }
    site.set_identifier(Some(INVERTER_NO_COLUMN));
    debug_assert_eq!(site.column_names(), SITE_COLUMNS.to_vec());
    site.sort_by_time_and_identifier();
    Ok((site, report))
}

fn project(
    fused: &Table,
    site: &mut Table,
    target: &str,
    source: &str,
    report: &mut SiteRecordReport,
) -> Result<(), TableError> {
    match fused.column(source) {
        Some(data) => site.add_column(crate::table::Column {
            name: target.to_string(),
            data: data.clone(),
        }),
        None => {
            report.synthesized.push(target.to_string());
            let data = if target == INVERTER_NO_COLUMN {
                ColumnData::Text(vec![None; fused.len()])
            } else {
                ColumnData::Numeric(vec![None; fused.len()])
            };
            site.add_column(crate::table::Column {
                name: target.to_string(),
                data,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn slots(n: usize, step: i64) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 6, 12)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::minutes(step * i as i64))
            .collect()
    }

    fn operating(ids: &[&str], times: &[NaiveDateTime]) -> Table {
        let mut all_times = Vec::new();
        let mut all_ids = Vec::new();
        for id in ids {
            for t in times {
                all_times.push(*t);
                all_ids.push(Some(id.to_string()));
            }
        }
        let n = all_times.len();
        let mut table = Table::new(all_times).with_identifier(DEVICE_ID_COLUMN);
        for name in INVERTER_COLUMNS {
            table.add_numeric(name, vec![Some(1.0); n]).unwrap();
        }
        table.add_text(DEVICE_ID_COLUMN, all_ids).unwrap();
        table
    }

    fn irradiance(times: &[NaiveDateTime]) -> Table {
        let n = times.len();
        let mut table = Table::new(times.to_vec()).with_identifier(DEVICE_ID_COLUMN);
        table.add_numeric("ambient_temp1", vec![Some(20.0); n]).unwrap();
        table.add_numeric("ambient_temp2", vec![Some(21.0); n]).unwrap();
        table.add_numeric("ambient_rh", vec![Some(50.0); n]).unwrap();
        table.add_numeric("ir", vec![Some(800.0); n]).unwrap();
        table.add_text(DEVICE_ID_COLUMN, vec![Some("ir".to_string()); n]).unwrap();
        table
    }

    fn sensor(id: &str, times: &[NaiveDateTime]) -> Table {
        let n = times.len();
        let mut table = Table::new(times.to_vec()).with_identifier(DEVICE_ID_COLUMN);
        table.add_numeric("inv_temp1", vec![Some(35.0); n]).unwrap();
        table.add_numeric("inv_temp2", vec![Some(36.0); n]).unwrap();
        table.add_numeric("inv_rh", vec![Some(10.0); n]).unwrap();
        table.add_text(DEVICE_ID_COLUMN, vec![Some(id.to_string()); n]).unwrap();
        table
    }

    #[test]
    fn test_fusion_keeps_every_slot_of_the_denser_source() {
        let dense = irradiance(&slots(288, 5));
        let mut sparse = Table::new(slots(96, 15));
        sparse.add_numeric("voltage", vec![Some(480.0); 96]).unwrap();
        let fused = fuse_on_time(&[dense, sparse], "_de").unwrap();
        assert!(fused.len() >= 288);
        let voltage = fused.numeric("voltage").unwrap();
        assert_eq!(voltage.iter().flatten().count(), 96);
    }

    #[test]
    fn test_environmental_day_has_row_per_sensor() {
        let times = slots(4, 5);
        let env = environmental_day(
            Some(&irradiance(&times)),
            &[sensor("30", &times), sensor("29", &times)],
        )
        .unwrap();
        assert_eq!(env.len(), 8);
        assert_eq!(env.identifier(), Some(DEVICE_ID_COLUMN));
        assert_eq!(env.identifier_keys()[0].as_deref(), Some("29"));
        assert_eq!(env.numeric("ir").unwrap()[7], Some(800.0));
        assert!(env.identifier_keys().iter().all(|k| k.as_deref() != Some("ir")));
        assert!(!env.has_column(&format!("{}_sensor", DEVICE_ID_COLUMN)));
    }

    #[test]
    fn test_environmental_day_without_sensors_is_untagged() {
        let times = slots(3, 5);
        let env = environmental_day(Some(&irradiance(&times)), &[]).unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env.identifier(), None);
        assert!(!env.has_column(DEVICE_ID_COLUMN));
        assert_eq!(env.numeric("ir").unwrap(), &[Some(800.0); 3]);
    }

    #[test]
    fn test_site_record_maps_fields_by_name() {
        let times = slots(3, 5);
        let op = operating(&["1", "29"], &times);
        let env = environmental_day(Some(&irradiance(&times)), &[sensor("29", &times)]).unwrap();
        let (site, report) = build_site_record(&op, &env).unwrap();

        assert_eq!(site.len(), 6);
        assert_eq!(site.column_names(), SITE_COLUMNS.to_vec());
        assert!(report.synthesized.is_empty());

        let inverter = site.identifier_keys();
        let cap = site.numeric("cap_temp").unwrap();
        let ambient = site.numeric("ambient_temp").unwrap();
        for i in 0..site.len() {
            assert_eq!(ambient[i], Some(21.0));
            match inverter[i].as_deref() {
                Some("29") => assert_eq!(cap[i], Some(35.0)),
                Some("1") => assert_eq!(cap[i], None),
                other => panic!("unexpected inverter {:?}", other),
            }
        }
    }

    #[test]
    fn test_site_record_counts_rows_without_inverter() {
        let times = slots(3, 5);
        let op = operating(&["29"], &times[..2]);
        let env = environmental_day(Some(&irradiance(&times)), &[sensor("29", &times[..2])]).unwrap();
        let (site, report) = build_site_record(&op, &env).unwrap();
        assert_eq!(report.rows_without_inverter, 1);
        assert_eq!(site.len(), 2);
        assert!(site.identifier_keys().iter().all(Option::is_some));
    }

    #[test]
    fn test_site_record_synthesizes_missing_environment() {
        let times = slots(2, 5);
        let op = operating(&["5"], &times);
        let (site, report) = build_site_record(&op, &Table::new(Vec::new())).unwrap();
        assert_eq!(site.len(), 2);
        assert!(report.synthesized.contains(&"ir".to_string()));
        assert_eq!(site.numeric("rh").unwrap(), &[None, None]);
    }
}

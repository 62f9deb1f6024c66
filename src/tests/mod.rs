//! Cross-module properties of the grid, alignment, fusion and cleaning
//! chain.

use crate::aligner::{align_samples, ChannelMeasurement, Sample};
use crate::cleaning::{clean_sp, impute_series, impute_with_ghi};
use crate::climatology::{Bounds, ReferenceBounds};
use crate::composer::DeviceRecordComposer;
use crate::config::DeviceEntry;
use crate::fusion::{build_site_record, environmental_day, fuse_on_time};
use crate::grid::{TimeGrid, MINUTES_PER_DAY};
use crate::schema::{DeviceClass, DeviceSchema, EXPORT_SP_FIELDS, SITE_COLUMNS};
use crate::table::Table;
use crate::weather::{add_weather_score, weather_score};
use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use serde_json::json;

const SITE_TZ: Tz = chrono_tz::America::New_York;

fn june_12() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
}

fn device(component_id: &str, class: DeviceClass, identifier: &str) -> DeviceEntry {
    DeviceEntry {
        component_id: component_id.to_string(),
        class,
        identifier: identifier.to_string(),
    }
}

/// One sample per grid slot, valued `offset + slot index`.
fn full_channel(grid: &TimeGrid, component_id: &str, channel_id: &str, offset: f64) -> ChannelMeasurement {
    ChannelMeasurement {
        component_id: component_id.to_string(),
        channel_id: channel_id.to_string(),
        values: grid
            .slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| json!({ "time": slot.to_rfc3339(), "value": offset + i as f64 }))
            .collect(),
    }
}

fn reference_bounds() -> ReferenceBounds {
    ReferenceBounds {
        ghi: Bounds { min: 0.0, max: 1000.0 },
        temperature: Bounds { min: -20.0, max: 45.0 },
        relative_humidity: Bounds { min: 5.0, max: 100.0 },
    }
}

#[test]
fn test_grid_length_outside_dst_transitions() {
    for interval in [1, 5, 15, 60] {
        let grid = TimeGrid::for_day(june_12(), interval, SITE_TZ).unwrap();
        assert_eq!(grid.len(), (MINUTES_PER_DAY / interval) as usize);
    }
}

#[test]
fn test_grid_lengths_over_a_dst_year() {
    let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut short = Vec::new();
    let mut long = Vec::new();
    while day.year() == 2024 {
        let grid = TimeGrid::for_day(day, 5, SITE_TZ).unwrap();
        match grid.len() {
            288 => {}
            276 => short.push(day),
            300 => long.push(day),
            other => panic!("{} has {} slots", day, other),
        }
        day += Duration::days(1);
    }
    assert_eq!(short, vec![NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()]);
    assert_eq!(long, vec![NaiveDate::from_ymd_opt(2024, 11, 3).unwrap()]);
}

#[test]
fn test_aligned_length_matches_grid() {
    let grid = TimeGrid::for_day(june_12(), 5, SITE_TZ).unwrap();
    let (values, stats) = align_samples(Vec::new(), &grid);
    assert_eq!(values.len(), grid.len());
    assert!(values.iter().all(Option::is_none));
    assert_eq!(stats.placed, 0);

    let first = grid.slots()[0];
    let samples = vec![
        Sample { time: first - Duration::minutes(3), value: Some(1.0) },
        Sample { time: first + Duration::minutes(2), value: Some(2.0) },
        Sample { time: first + Duration::days(2), value: Some(3.0) },
    ];
    let (values, stats) = align_samples(samples, &grid);
    assert_eq!(values.len(), grid.len());
    assert_eq!(values[1], Some(2.0));
    assert_eq!(stats.out_of_range, 2);
}

#[test]
fn test_composer_round_trips_fully_present_samples() {
    let grid = TimeGrid::for_day(june_12(), 15, SITE_TZ).unwrap();
    let schema = DeviceSchema::for_class(DeviceClass::IrradianceSensor).unwrap();
    let entry = device("irr-1", DeviceClass::IrradianceSensor, "site");
    let measurements: Vec<ChannelMeasurement> = schema
        .channels
        .iter()
        .enumerate()
        .map(|(k, spec)| full_channel(&grid, "irr-1", &spec.channel_id, 1000.0 * k as f64))
        .collect();

    let day = DeviceRecordComposer::new(&grid)
        .compose(&entry, &schema, &measurements)
        .unwrap();
    assert!(!day.all_absent);
    assert!(day.missing_channels.is_empty());
    assert_eq!(day.table.len(), grid.len());
    assert_eq!(day.table.time(), grid.local_times().as_slice());
    for (k, spec) in schema.channels.iter().enumerate() {
        let expected: Vec<Option<f64>> = (0..grid.len())
            .map(|i| Some(1000.0 * k as f64 + i as f64))
            .collect();
        assert_eq!(day.table.numeric(&spec.column).unwrap(), expected.as_slice());
    }
}

#[test]
fn test_site_chain_projects_onto_site_schema() {
    let grid = TimeGrid::for_day(june_12(), 5, SITE_TZ).unwrap();
    let composer = DeviceRecordComposer::new(&grid);

    let inverter_schema = DeviceSchema::for_class(DeviceClass::Inverter).unwrap();
    let inverter = composer
        .compose(
            &device("inv-29", DeviceClass::Inverter, "29"),
            &inverter_schema,
            &[full_channel(&grid, "inv-29", &inverter_schema.channels[0].channel_id, 100.0)],
        )
        .unwrap();
    assert_eq!(inverter.missing_channels.len(), inverter_schema.channels.len() - 1);

    let sensor_schema = DeviceSchema::for_class(DeviceClass::EnvironmentalSensor).unwrap();
    let sensor = composer
        .compose(
            &device("env-29", DeviceClass::EnvironmentalSensor, "29"),
            &sensor_schema,
            &[full_channel(&grid, "env-29", &sensor_schema.channels[0].channel_id, 20.0)],
        )
        .unwrap();

    let irradiance_schema = DeviceSchema::for_class(DeviceClass::IrradianceSensor).unwrap();
    let ir_channel = irradiance_schema
        .channels
        .iter()
        .find(|c| c.column == "ir")
        .unwrap();
    let irradiance = composer
        .compose(
            &device("irr-1", DeviceClass::IrradianceSensor, "site"),
            &irradiance_schema,
            &[full_channel(&grid, "irr-1", &ir_channel.channel_id, 0.0)],
        )
        .unwrap();

    let environmental = environmental_day(Some(&irradiance.table), &[sensor.table]).unwrap();
    let (site, report) = build_site_record(&inverter.table, &environmental).unwrap();

    assert_eq!(site.column_names(), SITE_COLUMNS.to_vec());
    assert_eq!(site.len(), grid.len());
    assert_eq!(report.rows_without_inverter, 0);
    let ac_power = site.numeric(&inverter_schema.channels[0].column).unwrap();
    assert_eq!(ac_power[10], Some(110.0));
    assert_eq!(site.numeric("ir").unwrap()[10], Some(10.0));
    assert_eq!(site.numeric("cap_temp").unwrap()[10], Some(30.0));
    assert!(site.numeric("rh").unwrap().iter().all(Option::is_none));
}

#[test]
fn test_fusing_coarser_grid_keeps_every_fine_slot() {
    let date = june_12();
    let fine = TimeGrid::for_day(date, 5, SITE_TZ).unwrap();
    let coarse = TimeGrid::for_day(date, 15, SITE_TZ).unwrap();

    let mut a = Table::new(fine.local_times());
    a.add_numeric("ac_power", vec![Some(1.0); fine.len()]).unwrap();
    let mut b = Table::new(coarse.local_times());
    b.add_numeric("ghi", vec![Some(2.0); coarse.len()]).unwrap();

    let fused = fuse_on_time(&[a, b], "_b").unwrap();
    assert!(fused.len() >= 288);
    let ghi = fused.numeric("ghi").unwrap();
    assert_eq!(ghi.iter().filter(|v| v.is_some()).count(), 96);
}

#[test]
fn test_ghi_rule_cases() {
    let mut sp = vec![None];
    impute_series(&mut sp, &[Some(0.0)]);
    assert_eq!(sp, vec![Some(0.0)]);

    let mut sp = vec![Some(10.0), None, Some(20.0)];
    impute_series(&mut sp, &[Some(5.0); 3]);
    assert_eq!(sp, vec![Some(10.0), Some(10.0), Some(20.0)]);

    let mut sp = vec![None, Some(7.0)];
    impute_series(&mut sp, &[Some(5.0), Some(5.0)]);
    assert_eq!(sp[0], Some(7.0));

    let mut sp = vec![None, None];
    impute_series(&mut sp, &[None, Some(-1.0)]);
    assert_eq!(sp, vec![None, None]);
}

#[test]
fn test_cleaning_is_idempotent() {
    let times = TimeGrid::for_day(june_12(), 60, SITE_TZ).unwrap().local_times();
    let n = times.len();
    let mut site = Table::new(times.clone());
    let mut ac_power: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64)).collect();
    ac_power[3] = None;
    site.add_numeric("ac_power", ac_power).unwrap();
    let mut ir: Vec<Option<f64>> = vec![Some(500.0); n];
    ir[5] = Some(5000.0);
    site.add_numeric("ir", ir).unwrap();
    let mut temp: Vec<Option<f64>> = vec![Some(25.0); n];
    temp[7] = Some(90.0);
    site.add_numeric("ambient_temp", temp).unwrap();

    let bounds = reference_bounds();
    let first = clean_sp(&mut site, &bounds).unwrap();
    assert_eq!(first.off_state_forced, 1);
    assert_eq!(first.bounds_violations, 2);
    let once = site.clone();
    let second = clean_sp(&mut site, &bounds).unwrap();
    assert_eq!(second.off_state_forced, 0);
    assert_eq!(second.bounds_violations, 0);
    assert_eq!(site, once);

    let mut export = Table::new(times);
    let ghi: Vec<Option<f64>> = (0..n).map(|i| Some(if i < 6 { 0.0 } else { 100.0 })).collect();
    export.add_numeric("AE_GHI", ghi).unwrap();
    let mut power: Vec<Option<f64>> = vec![None; n];
    power[10] = Some(40.0);
    export.add_numeric("SP_ac_power", power).unwrap();
    impute_with_ghi(&mut export, "AE_GHI", EXPORT_SP_FIELDS).unwrap();
    let once = export.clone();
    let report = impute_with_ghi(&mut export, "AE_GHI", EXPORT_SP_FIELDS).unwrap();
    assert_eq!(report.zero_filled + report.neighbour_filled + report.default_filled, 0);
    assert_eq!(export, once);
    let power = export.numeric("SP_ac_power").unwrap();
    // Zero-filled night slots count as present neighbours.
    assert_eq!(power[6], Some(0.0));
    assert_eq!(power[11], Some(40.0));
}

#[test]
fn test_weather_scores() {
    assert_eq!(weather_score("Rain/Thunder"), 15);
    assert_eq!(weather_score("Fair"), 0);

    let times = TimeGrid::for_day(june_12(), 60, SITE_TZ).unwrap().local_times();
    let mut ws = Table::new(times[..3].to_vec());
    ws.add_text(
        "weather_condition",
        vec![Some("Rain/Thunder".to_string()), Some("Fair".to_string()), None],
    )
    .unwrap();
    add_weather_score(&mut ws).unwrap();
    add_weather_score(&mut ws).unwrap();
    assert_eq!(ws.numeric("weather_score").unwrap(), &[Some(15.0), Some(0.0), Some(0.0)]);
    assert_eq!(ws.columns().len(), 2);
}

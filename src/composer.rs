use crate::aligner::{align_channel, AlignedChannel, AlignmentStats, ChannelMeasurement, ChannelStatus};
use crate::config::DeviceEntry;
use crate::errors::TableError;
use crate::grid::TimeGrid;
use crate::schema::{DeviceClass, DeviceSchema};
use crate::table::Table;
use log::{debug, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// One device's record for one day, one row per grid slot.
#[derive(Debug, Clone)]
pub struct DeviceDay {
    pub component_id: String,
    pub identifier: String,
    pub class: DeviceClass,
    pub table: Table,
    /// Every channel is absent in every slot.
    pub all_absent: bool,
    /// Declared channels the source delivered nothing for.
    pub missing_channels: Vec<String>,
    pub malformed_channels: Vec<String>,
    pub stats: AlignmentStats,
}

pub struct DeviceRecordComposer<'a> {
    grid: &'a TimeGrid,
}

impl<'a> DeviceRecordComposer<'a> {
    pub fn new(grid: &'a TimeGrid) -> Self {
        Self { grid }
    }

    /// Align each declared channel by id and lay the columns out in schema
    /// order, followed by the identifier column.
    pub fn compose(
        &self,
        device: &DeviceEntry,
        schema: &DeviceSchema,
        measurements: &[ChannelMeasurement],
    ) -> Result<DeviceDay, TableError> {
        let mut by_channel: HashMap<&str, &ChannelMeasurement> = HashMap::new();
        for m in measurements {
            if m.component_id != device.component_id {
                debug!(
                    "Ignoring measurement for component {} while composing {}",
                    m.component_id, device.component_id
                );
                continue;
            }
            match by_channel.entry(m.channel_id.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(m);
                }
                Entry::Occupied(_) => warn!(
                    "Component {} delivered channel {} more than once; keeping the first",
                    device.component_id, m.channel_id
                ),
            }
        }

        let mut missing_channels = Vec::new();
        let mut malformed_channels = Vec::new();
        let mut stats = AlignmentStats::default();
        let mut aligned: Vec<AlignedChannel> = Vec::with_capacity(schema.channels.len());

        for spec in &schema.channels {
            let channel = match by_channel.get(spec.channel_id.as_str()) {
                Some(m) => align_channel(m, self.grid),
                None => {
                    missing_channels.push(spec.channel_id.clone());
                    AlignedChannel::absent(self.grid.len(), ChannelStatus::Empty)
                }
            };
            if let ChannelStatus::Malformed(_) = channel.status {
                malformed_channels.push(spec.channel_id.clone());
            }
            stats.placed += channel.stats.placed;
            stats.nulls += channel.stats.nulls;
            stats.duplicates += channel.stats.duplicates;
            stats.out_of_range += channel.stats.out_of_range;
            aligned.push(channel);
        }

        let all_absent = aligned.iter().all(AlignedChannel::is_all_absent);
        let mut table = Table::new(self.grid.local_times());
        for (spec, channel) in schema.channels.iter().zip(aligned) {
            table.add_numeric(&spec.column, channel.values)?;
        }
        self.tag_identifier(&mut table, device, schema)?;

        Ok(DeviceDay {
            component_id: device.component_id.clone(),
            identifier: device.identifier.clone(),
            class: device.class,
            table,
            all_absent,
            missing_channels,
            malformed_channels,
            stats,
        })
    }

    /// Fully absent record for a device whose source could not be reached.
    pub fn absent(&self, device: &DeviceEntry, schema: &DeviceSchema) -> Result<DeviceDay, TableError> {
        let mut table = Table::new(self.grid.local_times());
        for spec in &schema.channels {
            table.add_numeric(&spec.column, vec![None; self.grid.len()])?;
        }
        self.tag_identifier(&mut table, device, schema)?;
        Ok(DeviceDay {
            component_id: device.component_id.clone(),
            identifier: device.identifier.clone(),
            class: device.class,
            table,
            all_absent: true,
            missing_channels: schema.channels.iter().map(|c| c.channel_id.clone()).collect(),
            malformed_channels: Vec::new(),
            stats: AlignmentStats::default(),
        })
    }

    fn tag_identifier(
        &self,
        table: &mut Table,
        device: &DeviceEntry,
        schema: &DeviceSchema,
    ) -> Result<(), TableError> {
        if let Some(id_column) = schema.identifier_column.as_deref() {
            table.add_text(id_column, vec![Some(device.identifier.clone()); self.grid.len()])?;
            table.set_identifier(Some(id_column));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DEVICE_ID_COLUMN, ENVIRONMENTAL_SENSOR_COLUMNS};
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;
    use serde_json::json;

    fn grid() -> TimeGrid {
        TimeGrid::for_day(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(), 5, New_York).unwrap()
    }

    fn sensor() -> DeviceEntry {
        DeviceEntry {
            component_id: "10764334".to_string(),
            class: DeviceClass::EnvironmentalSensor,
            identifier: "29".to_string(),
        }
    }

    fn full_channel(grid: &TimeGrid, channel: &str, base: f64) -> ChannelMeasurement {
        let values = grid
            .slots()
            .iter()
            .enumerate()
            .map(|(i, t)| {
                json!({
                    "time": t.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    "value": base + i as f64,
                })
            })
            .collect();
        ChannelMeasurement {
            component_id: "10764334".to_string(),
            channel_id: channel.to_string(),
            values,
        }
    }

    #[test]
    fn test_fully_present_samples_round_trip() {
        let grid = grid();
        let schema = DeviceSchema::for_class(DeviceClass::EnvironmentalSensor).unwrap();
        // Deliver channels out of declaration order; mapping is by id.
        let measurements = vec![
            full_channel(&grid, "Measurement.InOut.ValNom", 300.0),
            full_channel(&grid, "Measurement.InOut.Tmp[0]", 100.0),
            full_channel(&grid, "Measurement.InOut.Tmp[1]", 200.0),
        ];
        let day = DeviceRecordComposer::new(&grid)
            .compose(&sensor(), &schema, &measurements)
            .unwrap();

        assert!(!day.all_absent);
        assert_eq!(day.table.len(), 288);
        let mut expected_names = ENVIRONMENTAL_SENSOR_COLUMNS.to_vec();
        expected_names.push(DEVICE_ID_COLUMN);
        assert_eq!(day.table.column_names(), expected_names);
        let temp1 = day.table.numeric("inv_temp1").unwrap();
        let rh = day.table.numeric("inv_rh").unwrap();
        for i in 0..grid.len() {
            assert_eq!(temp1[i], Some(100.0 + i as f64));
            assert_eq!(rh[i], Some(300.0 + i as f64));
        }
        assert_eq!(day.table.identifier(), Some(DEVICE_ID_COLUMN));
    }

    #[test]
    fn test_missing_channels_are_absent_and_flagged() {
        let grid = grid();
        let schema = DeviceSchema::for_class(DeviceClass::EnvironmentalSensor).unwrap();
        let day = DeviceRecordComposer::new(&grid)
            .compose(&sensor(), &schema, &[])
            .unwrap();
        assert!(day.all_absent);
        assert_eq!(day.missing_channels.len(), 3);
        assert_eq!(day.table.len(), grid.len());
    }

    #[test]
    fn test_partial_channel_leaves_gaps() {
        let grid = grid();
        let schema = DeviceSchema::for_class(DeviceClass::EnvironmentalSensor).unwrap();
        let noon = grid.slots()[144];
        let m = ChannelMeasurement {
            component_id: "10764334".to_string(),
            channel_id: "Measurement.InOut.Tmp[0]".to_string(),
            values: vec![json!({"time": noon.format("%Y-%m-%dT%H:%M:%SZ").to_string(), "value": 31.5})],
        };
        let day = DeviceRecordComposer::new(&grid)
            .compose(&sensor(), &schema, &[m])
            .unwrap();
        let temp = day.table.numeric("inv_temp1").unwrap();
        assert_eq!(temp[144], Some(31.5));
        assert_eq!(temp.iter().flatten().count(), 1);
        assert!(!day.all_absent);
    }

    #[test]
    fn test_irradiance_record_is_tagged_from_registry() {
        let grid = grid();
        let registry = crate::config::PipelineConfig::default().registry().unwrap();
        let entry = registry.get("10764341").unwrap();
        let schema = DeviceSchema::for_class(DeviceClass::IrradianceSensor).unwrap();
        let day = DeviceRecordComposer::new(&grid)
            .compose(entry, &schema, &[])
            .unwrap();
        assert_eq!(day.table.identifier(), Some(DEVICE_ID_COLUMN));
        assert_eq!(day.table.column_names().last(), Some(&DEVICE_ID_COLUMN));
        assert!(day
            .table
            .identifier_keys()
            .iter()
            .all(|k| k.as_deref() == Some("ir")));
    }
}

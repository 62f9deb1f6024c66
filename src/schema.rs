//! Named channel to column schemas per device class, plus the fixed column
//! lists of the raw and processed tables.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const DEVICE_ID_COLUMN: &str = "device_id";
pub const INVERTER_NO_COLUMN: &str = "inverter_no";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Inverter,
    EnvironmentalSensor,
    IrradianceSensor,
    WeatherStation,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceClass::Inverter => "inverter",
            DeviceClass::EnvironmentalSensor => "environmental_sensor",
            DeviceClass::IrradianceSensor => "irradiance_sensor",
            DeviceClass::WeatherStation => "weather_station",
        };
        f.write_str(name)
    }
}

/// Aggregation the measurement source applies when several raw readings
/// fall into one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiAggregate {
    Avg,
    Min,
    Sum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub channel_id: String,
    pub column: String,
    pub multi_aggregate: MultiAggregate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSchema {
    pub class: DeviceClass,
    pub channels: Vec<ChannelSpec>,
    /// Column appended to every row with the device's stable identifier.
    pub identifier_column: Option<String>,
}

const INVERTER_CHANNELS: &[(&str, MultiAggregate)] = &[
    ("Measurement.GridMs.TotW.Pv", MultiAggregate::Sum),
    ("Measurement.GridMs.W.phsA", MultiAggregate::Sum),
    ("Measurement.GridMs.W.phsB", MultiAggregate::Sum),
    ("Measurement.GridMs.W.phsC", MultiAggregate::Sum),
    ("Measurement.GridMs.TotVAr", MultiAggregate::Sum),
    ("Measurement.GridMs.VAr.phsA", MultiAggregate::Sum),
    ("Measurement.GridMs.VAr.phsB", MultiAggregate::Sum),
    ("Measurement.GridMs.VAr.phsC", MultiAggregate::Sum),
    ("Measurement.GridMs.TotVA", MultiAggregate::Sum),
    ("Measurement.GridMs.VA.phsA", MultiAggregate::Sum),
    ("Measurement.GridMs.VA.phsB", MultiAggregate::Sum),
    ("Measurement.GridMs.VA.phsC", MultiAggregate::Sum),
    ("Measurement.GridMs.PhV.phsA", MultiAggregate::Avg),
    ("Measurement.GridMs.PhV.phsB", MultiAggregate::Avg),
    ("Measurement.GridMs.PhV.phsC", MultiAggregate::Avg),
    ("Measurement.GridMs.A.phsA", MultiAggregate::Sum),
    ("Measurement.GridMs.A.phsB", MultiAggregate::Sum),
    ("Measurement.GridMs.A.phsC", MultiAggregate::Sum),
    ("Measurement.GridMs.Hz", MultiAggregate::Avg),
    ("Measurement.DcMs.Watt[0]", MultiAggregate::Sum),
    ("Measurement.DcMs.Watt[1]", MultiAggregate::Sum),
    ("Measurement.DcMs.Vol[0]", MultiAggregate::Avg),
    ("Measurement.DcMs.Vol[1]", MultiAggregate::Avg),
    ("Measurement.DcMs.Amp[0]", MultiAggregate::Sum),
    ("Measurement.DcMs.Amp[1]", MultiAggregate::Sum),
    ("Measurement.Isolation.LeakRis", MultiAggregate::Min),
];

pub const INVERTER_COLUMNS: &[&str] = &[
    "ac_power",
    "ac_power_l1",
    "ac_power_l2",
    "ac_power_l3",
    "ac_reactive_power",
    "ac_reactive_power_l1",
    "ac_reactive_power_l2",
    "ac_reactive_power_l3",
    "ac_apparent_power",
    "ac_apparent_power_l1",
    "ac_apparent_power_l2",
    "ac_apparent_power_l3",
    "ac_voltage_l1",
    "ac_voltage_l2",
    "ac_voltage_l3",
    "ac_current_l1",
    "ac_current_l2",
    "ac_current_l3",
    "grid_frequency",
    "dc_power_a",
    "dc_power_b",
    "dc_voltage_a",
    "dc_voltage_b",
    "dc_current_a",
    "dc_current_b",
    "iso",
];

const SENSOR_CHANNELS: &[(&str, MultiAggregate)] = &[
    ("Measurement.InOut.Tmp[0]", MultiAggregate::Avg),
    ("Measurement.InOut.Tmp[1]", MultiAggregate::Avg),
    ("Measurement.InOut.ValNom", MultiAggregate::Sum),
];

const IRRADIANCE_CHANNELS: &[(&str, MultiAggregate)] = &[
    ("Measurement.InOut.Tmp[0]", MultiAggregate::Avg),
    ("Measurement.InOut.Tmp[1]", MultiAggregate::Avg),
    ("Measurement.InOut.ValNom", MultiAggregate::Sum),
    ("Measurement.InOut.TotInsol", MultiAggregate::Sum),
];

pub const ENVIRONMENTAL_SENSOR_COLUMNS: &[&str] = &["inv_temp1", "inv_temp2", "inv_rh"];
pub const IRRADIANCE_COLUMNS: &[&str] = &["ambient_temp1", "ambient_temp2", "ambient_rh", "ir"];

pub const WEATHER_COLUMNS: &[&str] = &["ambient_temperature", "relative_humidity", "weather_condition"];
pub const WEATHER_CONDITION_COLUMN: &str = "weather_condition";
pub const WEATHER_SCORE_COLUMN: &str = "weather_score";

/// Site record fields after `time`, in storage order.
pub const SITE_COLUMNS: &[&str] = &[
    "ac_power",
    "ac_power_l1",
    "ac_power_l2",
    "ac_power_l3",
    "ac_reactive_power",
    "ac_reactive_power_l1",
    "ac_reactive_power_l2",
    "ac_reactive_power_l3",
    "ac_apparent_power",
    "ac_apparent_power_l1",
    "ac_apparent_power_l2",
    "ac_apparent_power_l3",
    "ac_voltage_l1",
    "ac_voltage_l2",
    "ac_voltage_l3",
    "ac_current_l1",
    "ac_current_l2",
    "ac_current_l3",
    "grid_frequency",
    "dc_power_a",
    "dc_power_b",
    "dc_voltage_a",
    "dc_voltage_b",
    "dc_current_a",
    "dc_current_b",
    "iso",
    "ir",
    "ambient_temp",
    "ambient_rh",
    "cap_temp",
    "relay_temp",
    "rh",
    INVERTER_NO_COLUMN,
];

pub const AE_COLUMNS: &[&str] = &["ghi", "poa", "ambient_temp", "module_temp"];

pub const EXPORT_COLUMNS: &[&str] = &[
    "AE_GHI",
    "SP_ambient_temp",
    "SP_rh",
    "SP_ac_power",
    "SP_cap_temp",
    "SP_relay_temp",
    "SP_internal_rh",
];

/// Export fields subject to the GHI-conditioned imputation.
pub const EXPORT_SP_FIELDS: &[&str] = &[
    "SP_ambient_temp",
    "SP_rh",
    "SP_ac_power",
    "SP_cap_temp",
    "SP_relay_temp",
    "SP_internal_rh",
];

impl DeviceSchema {
    /// Build a schema from separately declared channel and column lists.
    /// The lists must pair up one to one.
    pub fn new(
        class: DeviceClass,
        channels: &[(&str, MultiAggregate)],
        columns: &[&str],
        identifier_column: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let mut missing: Vec<String> = columns
            .iter()
            .skip(channels.len())
            .map(|c| c.to_string())
            .collect();
        let mut extra: Vec<String> = channels
            .iter()
            .skip(columns.len())
            .map(|(c, _)| c.to_string())
            .collect();

        let mut seen_channels = HashSet::new();
        for (channel, _) in channels {
            if !seen_channels.insert(*channel) {
                extra.push(channel.to_string());
            }
        }
        let mut seen_columns = HashSet::new();
        for column in columns {
            if !seen_columns.insert(*column) || Some(*column) == identifier_column {
                missing.push(column.to_string());
            }
        }

        if !missing.is_empty() || !extra.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                table: class.to_string(),
                missing,
                extra,
            });
        }

        Ok(Self {
            class,
            channels: channels
                .iter()
                .zip(columns)
                .map(|((channel, aggregate), column)| ChannelSpec {
                    channel_id: channel.to_string(),
                    column: column.to_string(),
                    multi_aggregate: *aggregate,
                })
                .collect(),
            identifier_column: identifier_column.map(str::to_string),
        })
    }

    /// Schema for a channel-sourced device class. Weather stations deliver
    /// whole tables and have no channel schema.
    pub fn for_class(class: DeviceClass) -> Result<Self, PipelineError> {
        match class {
            DeviceClass::Inverter => {
                Self::new(class, INVERTER_CHANNELS, INVERTER_COLUMNS, Some(DEVICE_ID_COLUMN))
            }
            DeviceClass::EnvironmentalSensor => Self::new(
                class,
                SENSOR_CHANNELS,
                ENVIRONMENTAL_SENSOR_COLUMNS,
                Some(DEVICE_ID_COLUMN),
            ),
            DeviceClass::IrradianceSensor => Self::new(
                class,
                IRRADIANCE_CHANNELS,
                IRRADIANCE_COLUMNS,
                Some(DEVICE_ID_COLUMN),
            ),
            DeviceClass::WeatherStation => Err(PipelineError::Config(
                "weather stations are table-sourced and have no channel schema".to_string(),
            )),
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.column.as_str()).collect()
    }
}

use crate::errors::ConfigError;
use crate::schema::DeviceClass;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// What to do with a device/day whose channels are all absent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllAbsentPolicy {
    /// Keep the absent-filled record so the schema and row count stay stable.
    #[default]
    Keep,
    /// Leave the record out of the merged day table.
    Skip,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub component_id: String,
    pub class: DeviceClass,
    /// Stable identifier written into every row of the device's record.
    pub identifier: String,
}

impl DeviceEntry {
    fn new(component_id: &str, class: DeviceClass, identifier: &str) -> Self {
        Self {
            component_id: component_id.to_string(),
            class,
            identifier: identifier.to_string(),
        }
    }
}

/// Immutable set of known devices, checked for duplicate component ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRegistry {
    entries: Vec<DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new(entries: Vec<DeviceEntry>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.component_id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "devices".to_string(),
                    message: format!("component {} registered twice", entry.component_id),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn get(&self, component_id: &str) -> Option<&DeviceEntry> {
        self.entries.iter().find(|e| e.component_id == component_id)
    }

    pub fn of_class(&self, class: DeviceClass) -> impl Iterator<Item = &DeviceEntry> {
        self.entries.iter().filter(move |e| e.class == class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const SITE_INVERTERS: &[(&str, &str)] = &[
    ("10249473", "1"),
    ("10249449", "2"),
    ("10249460", "3"),
    ("10249447", "4"),
    ("10249448", "5"),
    ("10249468", "6"),
    ("10249454", "7"),
    ("10249463", "8"),
    ("10249450", "9"),
    ("10249466", "10"),
    ("16142275", "11"),
    ("10249455", "12"),
    ("10249464", "13"),
    ("10424760", "14"),
    ("10249471", "15"),
    ("10249457", "16"),
    ("10249459", "17"),
    ("10249452", "18"),
    ("10249451", "19"),
    ("10249465", "20"),
    ("10249453", "21"),
    ("10249467", "22"),
    ("10249456", "23"),
    ("10249458", "24"),
    ("10249461", "25"),
    ("10249470", "26"),
    ("10249499", "27"),
    ("10249489", "28"),
    ("10249492", "29"),
    ("10249486", "30"),
    ("10249504", "31"),
    ("10249498", "32"),
    ("13807225", "33"),
    ("15860505", "34"),
    ("10249476", "35"),
    ("10249496", "36"),
    ("10249497", "37"),
    ("10249494", "38"),
    ("10249483", "39"),
    ("10249481", "40"),
    ("10249474", "41"),
    ("11233877", "42"),
    ("15117262", "43"),
    ("10249475", "44"),
    ("10249501", "45"),
    ("10249484", "46"),
    ("10249480", "47"),
    ("10249493", "48"),
    ("10249479", "49"),
    ("10249485", "50"),
    ("10249478", "51"),
    ("10249477", "52"),
    ("10249490", "53"),
    ("10249488", "54"),
];

const SITE_ENVIRONMENTAL_SENSORS: &[(&str, &str)] =
    &[("10764334", "29"), ("10764335", "30"), ("10764336", "31")];

const SITE_IRRADIANCE_SENSOR: (&str, &str) = ("10764341", "ir");

fn site_devices() -> Vec<DeviceEntry> {
    let mut devices: Vec<DeviceEntry> = SITE_INVERTERS
        .iter()
        .map(|(component, id)| DeviceEntry::new(component, DeviceClass::Inverter, id))
        .collect();
    devices.extend(
        SITE_ENVIRONMENTAL_SENSORS
            .iter()
            .map(|(component, id)| DeviceEntry::new(component, DeviceClass::EnvironmentalSensor, id)),
    );
    devices.push(DeviceEntry::new(
        SITE_IRRADIANCE_SENSOR.0,
        DeviceClass::IrradianceSensor,
        SITE_IRRADIANCE_SENSOR.1,
    ));
    devices
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// IANA name of the site's civil time zone.
    pub timezone: String,
    pub interval_minutes: u32,
    /// Per-day source files (`sp/`, `ae/`, `ws/`, `de/`).
    pub data_dir: PathBuf,
    /// Raw measurement responses, `<date>/<component_id>.json`.
    pub measurement_dir: PathBuf,
    /// Typical-meteorological-year reference CSVs.
    pub climatology_dir: PathBuf,
    /// Tables written by the CSV store and exports.
    pub output_dir: PathBuf,
    pub all_absent_policy: AllAbsentPolicy,
    pub max_concurrent_fetches: usize,
    pub devices: Vec<DeviceEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            interval_minutes: 5,
            data_dir: PathBuf::from("data"),
            measurement_dir: PathBuf::from("data/measurements"),
            climatology_dir: PathBuf::from("tmy"),
            output_dir: PathBuf::from("output"),
            all_absent_policy: AllAbsentPolicy::Keep,
            max_concurrent_fetches: 8,
            devices: site_devices(),
        }
    }
}

impl PipelineConfig {
    /// Apply `PIPELINE_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(tz) = std::env::var("PIPELINE_TIMEZONE") {
            self.timezone = tz;
        }
        if let Ok(interval) = std::env::var("PIPELINE_INTERVAL_MINUTES") {
            self.interval_minutes = interval.parse().map_err(|_| ConfigError::InvalidValue {
                field: "interval_minutes".to_string(),
                message: format!("'{}' is not a whole number of minutes", interval),
            })?;
        }
        if let Ok(dir) = std::env::var("PIPELINE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PIPELINE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "timezone".to_string(),
                message: e.to_string(),
            })
    }

    pub fn registry(&self) -> Result<DeviceRegistry, ConfigError> {
        DeviceRegistry::new(self.devices.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.interval_minutes == 0 || crate::grid::MINUTES_PER_DAY % self.interval_minutes != 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval_minutes".to_string(),
                message: format!("{} does not divide a day", self.interval_minutes),
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_fetches".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.registry()?;
        Ok(())
    }
}

pub fn load_config(path_str: &str) -> Result<PipelineConfig, ConfigError> {
    let path = PathBuf::from(path_str);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }

    let file = File::open(&path).map_err(|e| ConfigError::IoError {
        path: path.clone(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let config: PipelineConfig =
        serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
            path: path.clone(),
            source: e,
        })?;

    config.validate()?;
    Ok(config)
}

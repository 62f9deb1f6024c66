//! Collect one day of device records from a measurement source.
//!
//! Fetches run concurrently on the async runtime, bounded by a semaphore.
//! Each response is aligned and composed independently on the rayon pool;
//! the merged day tables are then built by a single writer.

use crate::aligner::ChannelMeasurement;
use crate::composer::{DeviceDay, DeviceRecordComposer};
use crate::config::{AllAbsentPolicy, DeviceEntry, DeviceRegistry, PipelineConfig};
use crate::errors::{FetchError, PipelineError};
use crate::fetch::{build_query, fetch_with_retry, MeasurementSource};
use crate::fusion::environmental_day;
use crate::grid::TimeGrid;
use crate::metrics::METRICS;
use crate::parsers::write_table_csv;
use crate::retry::{fetch_retry_config, RetryConfig};
use crate::schema::{DeviceClass, DeviceSchema};
use crate::summary::{Outcome, RunSummary};
use crate::table::Table;
use chrono::NaiveDate;
use chrono_tz::Tz;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Merged device records of one day.
#[derive(Debug, Clone)]
pub struct DayCollection {
    pub date: NaiveDate,
    /// Every inverter, one row per slot per inverter.
    pub operating: Table,
    /// Irradiance record joined with every environmental sensor.
    pub environmental: Table,
    pub summary: RunSummary,
}

pub fn operating_day_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir
        .join("sp")
        .join("operating")
        .join(format!("sp_{}.csv", date.format("%Y-%m-%d")))
}

pub fn environmental_day_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir
        .join("sp")
        .join("environmental")
        .join(format!("sp_{}.csv", date.format("%Y-%m-%d")))
}

pub struct DayCollector<'a, S: MeasurementSource> {
    source: &'a S,
    registry: &'a DeviceRegistry,
    schemas: HashMap<DeviceClass, DeviceSchema>,
    tz: Tz,
    interval_minutes: u32,
    policy: AllAbsentPolicy,
    max_concurrent_fetches: usize,
    retry: RetryConfig,
}

impl<'a, S: MeasurementSource> DayCollector<'a, S> {
    /// Validates every channel schema the registry needs before any day is
    /// touched.
    pub fn new(
        source: &'a S,
        registry: &'a DeviceRegistry,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let mut schemas = HashMap::new();
        for entry in registry.entries() {
            if entry.class == DeviceClass::WeatherStation || schemas.contains_key(&entry.class) {
                continue;
            }
            schemas.insert(entry.class, DeviceSchema::for_class(entry.class)?);
        }
        Ok(Self {
            source,
            registry,
            schemas,
            tz: config.tz()?,
            interval_minutes: config.interval_minutes,
            policy: config.all_absent_policy,
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            retry: fetch_retry_config(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn collect_day(&self, date: NaiveDate) -> Result<DayCollection, PipelineError> {
        let grid = TimeGrid::for_day(date, self.interval_minutes, self.tz)?;
        let devices: Vec<&DeviceEntry> = self
            .registry
            .entries()
            .iter()
            .filter(|d| self.schemas.contains_key(&d.class))
            .collect();
        info!(
            "Collecting {} devices for {} ({} slots)",
            devices.len(),
            date,
            grid.len()
        );

        let fetched = self.fetch_all(&devices, date).await?;

        let composer = DeviceRecordComposer::new(&grid);
        let schemas = &self.schemas;
        let composed: Vec<(DeviceDay, Option<String>)> = fetched
            .into_par_iter()
            .map(|(device, result)| {
                let schema = &schemas[&device.class];
                match result {
                    Ok(measurements) => composer
                        .compose(device, schema, &measurements)
                        .map(|day| (day, None)),
                    Err(e) => composer
                        .absent(device, schema)
                        .map(|day| (day, Some(e.to_string()))),
                }
            })
            .collect::<Result<_, _>>()?;

        let collection = self.merge(date, composed)?;
        METRICS.lock().record_day();
        Ok(collection)
    }

    async fn fetch_all<'d>(
        &self,
        devices: &[&'d DeviceEntry],
        date: NaiveDate,
    ) -> Result<Vec<(&'d DeviceEntry, Result<Vec<ChannelMeasurement>, FetchError>)>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut futures = FuturesUnordered::new();

        for (index, device) in devices.iter().enumerate() {
            let request = build_query(device, &self.schemas[&device.class], date, self.tz)?;
            let semaphore = semaphore.clone();
            futures.push(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => fetch_with_retry(self.source, &request, &self.retry).await,
                    Err(e) => Err(FetchError::Unavailable {
                        component_id: request.component_id.clone(),
                        message: e.to_string(),
                    }),
                };
                (index, result)
            });
        }

        let mut results: Vec<(usize, Result<Vec<ChannelMeasurement>, FetchError>)> =
            Vec::with_capacity(devices.len());
        while let Some(done) = futures.next().await {
            results.push(done);
        }
        results.sort_by_key(|(index, _)| *index);
        Ok(results
            .into_iter()
            .map(|(index, result)| (devices[index], result))
            .collect())
    }

    fn merge(
        &self,
        date: NaiveDate,
        composed: Vec<(DeviceDay, Option<String>)>,
    ) -> Result<DayCollection, PipelineError> {
        let mut summary = RunSummary::new();
        let mut inverters = Vec::new();
        let mut sensors = Vec::new();
        let mut irradiance: Option<Table> = None;

        for (day, failure) in composed {
            METRICS
                .lock()
                .record_device(day.stats.placed as u64, day.all_absent);
            let subject = format!("{} {}", day.class, day.identifier);
            if !day.malformed_channels.is_empty() {
                summary.record(date, &subject, Outcome::MalformedChannels(day.malformed_channels.clone()));
            }

            let keep = match failure {
                Some(reason) => {
                    warn!("{} on {}: {}; synthesized absent", subject, date, reason);
                    summary.record(date, &subject, Outcome::SourceUnavailable(reason));
                    true
                }
                None if day.all_absent => {
                    let kept = self.policy == AllAbsentPolicy::Keep;
                    summary.record(date, &subject, Outcome::AllChannelsAbsent { kept });
                    kept
                }
                None => true,
            };
            if !keep {
                continue;
            }

            match day.class {
                DeviceClass::Inverter => inverters.push(day.table),
                DeviceClass::EnvironmentalSensor => sensors.push(day.table),
                DeviceClass::IrradianceSensor => {
                    if irradiance.is_some() {
                        warn!("More than one irradiance sensor on {}; keeping the first", date);
                    } else {
                        irradiance = Some(day.table);
                    }
                }
                DeviceClass::WeatherStation => {}
            }
        }

        let mut operating = Table::concat_rows(&inverters)?;
        operating.sort_by_time_and_identifier();
        let environmental = environmental_day(irradiance.as_ref(), &sensors)?;

        Ok(DayCollection {
            date,
            operating,
            environmental,
            summary,
        })
    }
}

impl DayCollection {
    /// Write the operating and environmental day files under `data_dir`.
    pub fn write(&self, data_dir: &Path) -> Result<u64, PipelineError> {
        write_table_csv(&operating_day_path(data_dir, self.date), &self.operating)?;
        write_table_csv(&environmental_day_path(data_dir, self.date), &self.environmental)?;
        let rows = (self.operating.len() + self.environmental.len()) as u64;
        METRICS.lock().record_rows_written(rows);
        Ok(rows)
    }
}

//! Measurement source capability and query payloads.

use crate::aligner::ChannelMeasurement;
use crate::config::DeviceEntry;
use crate::errors::{FetchError, GridError};
use crate::metrics::METRICS;
use crate::retry::{retry_if, RetryConfig};
use crate::schema::{DeviceSchema, MultiAggregate};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Wire format of the query window bounds.
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";
const QUERY_AGGREGATE: &str = "Avg";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryItem {
    pub component_id: String,
    pub channel_id: String,
    pub timezone: String,
    pub aggregate: String,
    pub multi_aggregate: MultiAggregate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementQuery {
    pub query_items: Vec<QueryItem>,
    pub date_time_begin: String,
    pub date_time_end: String,
}

/// One device's query for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub date: NaiveDate,
    pub component_id: String,
    pub query: MeasurementQuery,
}

/// Anything that can answer a measurement query: the remote API, stored
/// responses, or a test double.
#[allow(async_fn_in_trait)]
pub trait MeasurementSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<ChannelMeasurement>, FetchError>;
}

fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Utc>, GridError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| GridError::UnrepresentableDay {
            date,
            tz: tz.name().to_string(),
        })
}

/// Query window: previous day 23:55 to this day 23:55 local, as UTC.
pub fn query_window(date: NaiveDate, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), GridError> {
    let cutoff = NaiveTime::from_hms_opt(23, 55, 0).unwrap_or(NaiveTime::MIN);
    let previous = date.pred_opt().ok_or_else(|| GridError::UnrepresentableDay {
        date,
        tz: tz.name().to_string(),
    })?;
    Ok((local_instant(previous, cutoff, tz)?, local_instant(date, cutoff, tz)?))
}

/// One query item per declared channel of the device's schema.
pub fn build_query(
    device: &DeviceEntry,
    schema: &DeviceSchema,
    date: NaiveDate,
    tz: Tz,
) -> Result<FetchRequest, GridError> {
    let (begin, end) = query_window(date, tz)?;
    let query_items = schema
        .channels
        .iter()
        .map(|spec| QueryItem {
            component_id: device.component_id.clone(),
            channel_id: spec.channel_id.clone(),
            timezone: tz.name().to_string(),
            aggregate: QUERY_AGGREGATE.to_string(),
            multi_aggregate: spec.multi_aggregate,
        })
        .collect();
    Ok(FetchRequest {
        date,
        component_id: device.component_id.clone(),
        query: MeasurementQuery {
            query_items,
            date_time_begin: begin.format(QUERY_TIME_FORMAT).to_string(),
            date_time_end: end.format(QUERY_TIME_FORMAT).to_string(),
        },
    })
}

impl FetchError {
    /// Worth another attempt: IO can recover, a bad payload or missing
    /// response will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::IoError { .. })
    }
}

/// Fetch with exponential backoff on transient errors.
pub async fn fetch_with_retry<S: MeasurementSource>(
    source: &S,
    request: &FetchRequest,
    config: &RetryConfig,
) -> Result<Vec<ChannelMeasurement>, FetchError> {
    let name = format!("fetch {} {}", request.component_id, request.date);
    let result = retry_if(config, &name, || source.fetch(request), FetchError::is_transient).await;
    METRICS.lock().record_fetch(result.is_ok());
    result
}

/// Stored responses laid out as `<root>/<YYYY-MM-DD>/<componentId>.json`,
/// each holding the list of channel measurements for that device and day.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    root: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, date: NaiveDate, component_id: &str) -> PathBuf {
        self.root
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", component_id))
    }
}

impl MeasurementSource for JsonDirectorySource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<ChannelMeasurement>, FetchError> {
        let path = self.path_for(request.date, &request.component_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::Unavailable {
                    component_id: request.component_id.clone(),
                    message: format!("no stored response at {}", path.display()),
                })
            }
            Err(e) => {
                return Err(FetchError::IoError {
                    component_id: request.component_id.clone(),
                    source: e,
                })
            }
        };
        let measurements: Vec<ChannelMeasurement> =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::DecodeError {
                component_id: request.component_id.clone(),
                source: e,
            })?;
        debug!(
            "Loaded {} channels for {} from {}",
            measurements.len(),
            request.component_id,
            path.display()
        );
        Ok(measurements)
    }
}

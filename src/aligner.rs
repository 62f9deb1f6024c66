use crate::grid::TimeGrid;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw samples for one channel of one component, as delivered by a
/// measurement source. Sample entries are kept as loose JSON so that a
/// malformed entry can be detected per channel instead of failing the whole
/// response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMeasurement {
    pub component_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentStats {
    pub placed: usize,
    pub nulls: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Aligned,
    /// No samples at all for the day.
    Empty,
    /// The sample list could not be interpreted; the column is all absent.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedChannel {
    pub values: Vec<Option<f64>>,
    pub stats: AlignmentStats,
    pub status: ChannelStatus,
}

impl AlignedChannel {
    pub fn absent(len: usize, status: ChannelStatus) -> Self {
        Self {
            values: vec![None; len],
            stats: AlignmentStats::default(),
            status,
        }
    }

    pub fn is_all_absent(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Interpret a raw sample value. JSON null, empty strings and the textual
/// spellings `null`/`NaN` are absent; numeric strings are accepted.
pub fn parse_sample_value(raw: &Value) -> Result<Option<f64>, String> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("unrepresentable number {}", n)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("null")
                || trimmed.eq_ignore_ascii_case("nan")
            {
                Ok(None)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(|v| if v.is_nan() { None } else { Some(v) })
                    .map_err(|_| format!("non-numeric value '{}'", trimmed))
            }
        }
        other => Err(format!("unexpected value type {}", other)),
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_sample_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn parse_samples(raw: &[Value]) -> Result<Vec<Sample>, String> {
    raw.iter()
        .enumerate()
        .map(|(i, entry)| {
            let obj = entry
                .as_object()
                .ok_or_else(|| format!("sample {} is not an object", i))?;
            let time_raw = obj
                .get("time")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("sample {} has no time", i))?;
            let time = parse_sample_time(time_raw)
                .ok_or_else(|| format!("sample {} has unparsable time '{}'", i, time_raw))?;
            let value_raw = obj
                .get("value")
                .ok_or_else(|| format!("sample {} has no value", i))?;
            let value = parse_sample_value(value_raw).map_err(|e| format!("sample {}: {}", i, e))?;
            Ok(Sample { time, value })
        })
        .collect()
}

/// Place samples onto the grid. Each sample lands in the first slot at or
/// after its instant; the first sample to reach a slot owns it.
pub fn align_samples(mut samples: Vec<Sample>, grid: &TimeGrid) -> (Vec<Option<f64>>, AlignmentStats) {
    let mut values = vec![None; grid.len()];
    let mut claimed = vec![false; grid.len()];
    let mut stats = AlignmentStats::default();

    samples.sort_by_key(|s| s.time);

    for sample in samples {
        let Some(idx) = grid.slot_for(sample.time) else {
            stats.out_of_range += 1;
            continue;
        };
        if claimed[idx] {
            stats.duplicates += 1;
            continue;
        }
        claimed[idx] = true;
        match sample.value {
            Some(v) => {
                values[idx] = Some(v);
                stats.placed += 1;
            }
            None => stats.nulls += 1,
        }
    }

    (values, stats)
}

/// Align one channel's raw measurement onto the grid. Never fails: a
/// malformed sample list yields an all-absent column with a warning.
pub fn align_channel(measurement: &ChannelMeasurement, grid: &TimeGrid) -> AlignedChannel {
    if measurement.values.is_empty() {
        return AlignedChannel::absent(grid.len(), ChannelStatus::Empty);
    }

    match parse_samples(&measurement.values) {
        Ok(samples) => {
            let (values, stats) = align_samples(samples, grid);
            AlignedChannel {
                values,
                stats,
                status: ChannelStatus::Aligned,
            }
        }
        Err(reason) => {
            warn!(
                "Discarding channel {} of component {} on {}: {}",
                measurement.channel_id,
                measurement.component_id,
                grid.date(),
                reason
            );
            AlignedChannel::absent(grid.len(), ChannelStatus::Malformed(reason))
        }
    }
}

//! Reference min/max envelopes from typical-meteorological-year files.

use crate::errors::PipelineError;
use csv::{ReaderBuilder, Trim};
use log::{info, warn};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// TMY exports start with two metadata lines before the header.
const TMY_METADATA_LINES: usize = 2;

pub const GHI_FIELD: &str = "GHI";
pub const TEMPERATURE_FIELD: &str = "Temperature";
pub const HUMIDITY_FIELD: &str = "Relative Humidity";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn observe(&mut self, v: f64) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn merge(&mut self, other: &Bounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn is_set(&self) -> bool {
        self.min <= self.max
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Loaded once per run and shared read-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceBounds {
    pub ghi: Bounds,
    pub temperature: Bounds,
    pub relative_humidity: Bounds,
}

impl ReferenceBounds {
    /// Extrema of one TMY file.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, String> {
        let mut buffered = BufReader::new(reader);
        for _ in 0..TMY_METADATA_LINES {
            let mut discard = String::new();
            buffered.read_line(&mut discard).map_err(|e| e.to_string())?;
        }
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(buffered);

        let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
        let index_of = |field: &str| {
            headers
                .iter()
                .position(|h| h == field)
                .ok_or_else(|| format!("missing column '{}'", field))
        };
        let ghi_idx = index_of(GHI_FIELD)?;
        let temp_idx = index_of(TEMPERATURE_FIELD)?;
        let rh_idx = index_of(HUMIDITY_FIELD)?;

        let mut bounds = ReferenceBounds {
            ghi: Bounds::empty(),
            temperature: Bounds::empty(),
            relative_humidity: Bounds::empty(),
        };
        for result in rdr.records() {
            let record = result.map_err(|e| e.to_string())?;
            let cell = |idx: usize| record.get(idx).and_then(|v| v.parse::<f64>().ok());
            if let Some(v) = cell(ghi_idx) {
                bounds.ghi.observe(v);
            }
            if let Some(v) = cell(temp_idx) {
                bounds.temperature.observe(v);
            }
            if let Some(v) = cell(rh_idx) {
                bounds.relative_humidity.observe(v);
            }
        }

        if !(bounds.ghi.is_set() && bounds.temperature.is_set() && bounds.relative_humidity.is_set()) {
            return Err("no numeric reference rows".to_string());
        }
        Ok(bounds)
    }

    /// Extrema across every `*.csv` under `dir`. Unreadable files are
    /// skipped; it is an error if none load.
    pub fn load_dir(dir: &Path) -> Result<Self, PipelineError> {
        let pattern = dir.join("*.csv");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| PipelineError::Climatology(format!("invalid pattern {}: {}", pattern, e)))?;

        let mut combined: Option<ReferenceBounds> = None;
        let mut loaded = 0usize;
        for path in paths.filter_map(Result::ok) {
            let parsed = std::fs::File::open(&path)
                .map_err(|e| e.to_string())
                .and_then(Self::from_reader);
            match parsed {
                Ok(bounds) => {
                    loaded += 1;
                    match combined.as_mut() {
                        Some(acc) => {
                            acc.ghi.merge(&bounds.ghi);
                            acc.temperature.merge(&bounds.temperature);
                            acc.relative_humidity.merge(&bounds.relative_humidity);
                        }
                        None => combined = Some(bounds),
                    }
                }
                Err(e) => warn!("Skipping reference file {}: {}", path.display(), e),
            }
        }

        let bounds = combined.ok_or_else(|| {
            PipelineError::Climatology(format!("no reference files could be loaded from {}", dir.display()))
        })?;
        info!(
            "Loaded reference bounds from {} files: GHI [{}, {}], temperature [{}, {}], RH [{}, {}]",
            loaded,
            bounds.ghi.min,
            bounds.ghi.max,
            bounds.temperature.min,
            bounds.temperature.max,
            bounds.relative_humidity.min,
            bounds.relative_humidity.max
        );
        Ok(bounds)
    }
}

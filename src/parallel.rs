use crate::errors::PipelineError;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use rayon::prelude::*;
use std::time::Instant;

/// Outcome of one day's unit of work.
#[derive(Debug)]
pub struct DayResult<T> {
    pub date: NaiveDate,
    pub result: Result<T, PipelineError>,
    pub processing_time_ms: u128,
}

pub fn progress_bar(len: u64, message: &str) -> ProgressBar {
    let progress = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        progress.set_style(style.progress_chars("#>-"));
    }
    progress.set_message(message.to_string());
    progress
}

/// Every date in `[start, end]`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Runs independent per-day work on the rayon pool.
pub struct DayProcessor {
    num_workers: usize,
}

impl Default for DayProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DayProcessor {
    pub fn new() -> Self {
        Self {
            num_workers: num_cpus::get(),
        }
    }

    /// Apply `work` to every day in parallel. Results come back in date
    /// order; a failed day is logged and does not stop the others.
    pub fn process_days<T, F>(&self, label: &str, days: Vec<NaiveDate>, work: F) -> Vec<DayResult<T>>
    where
        T: Send,
        F: Fn(NaiveDate) -> Result<T, PipelineError> + Sync,
    {
        info!(
            "{}: processing {} days on {} workers",
            label,
            days.len(),
            self.num_workers
        );
        let progress = progress_bar(days.len() as u64, label);

        let results: Vec<DayResult<T>> = days
            .into_par_iter()
            .map(|date| {
                let start = Instant::now();
                let result = work(date);
                if let Err(e) = &result {
                    error!("{} failed for {}: {}", label, date, e);
                }
                progress.inc(1);
                DayResult {
                    date,
                    result,
                    processing_time_ms: start.elapsed().as_millis(),
                }
            })
            .collect();

        progress.finish_with_message(format!("{} done", label));
        results
    }
}

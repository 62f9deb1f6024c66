use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Global run metrics.
pub static METRICS: Lazy<Mutex<Metrics>> = Lazy::new(|| Mutex::new(Metrics::new()));

#[derive(Debug, Default)]
pub struct Metrics {
    pub days_processed: u64,
    pub devices_composed: u64,
    pub fetches_attempted: u64,
    pub fetches_failed: u64,
    pub samples_placed: u64,
    pub all_absent_records: u64,
    pub join_ambiguities: u64,
    pub bounds_violations: u64,
    pub values_imputed: u64,
    pub rows_written: u64,
    pub processing_times: HashMap<String, Duration>,
    pub start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_day(&mut self) {
        self.days_processed += 1;
    }

    pub fn record_fetch(&mut self, ok: bool) {
        self.fetches_attempted += 1;
        if !ok {
            self.fetches_failed += 1;
        }
    }

    pub fn record_device(&mut self, samples_placed: u64, all_absent: bool) {
        self.devices_composed += 1;
        self.samples_placed += samples_placed;
        if all_absent {
            self.all_absent_records += 1;
        }
    }

    pub fn record_join_ambiguities(&mut self, count: u64) {
        self.join_ambiguities += count;
    }

    pub fn record_bounds_violations(&mut self, count: u64) {
        self.bounds_violations += count;
    }

    pub fn record_imputed(&mut self, count: u64) {
        self.values_imputed += count;
    }

    pub fn record_rows_written(&mut self, count: u64) {
        self.rows_written += count;
    }

    pub fn record_processing_time(&mut self, operation: String, duration: Duration) {
        *self.processing_times.entry(operation).or_default() += duration;
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time.map(|start| start.elapsed()).unwrap_or_default()
    }

    pub fn print_summary(&self) {
        println!("\n========== Pipeline Metrics Summary ==========");
        println!("Total Duration: {:.2?}", self.get_total_duration());
        println!("Days Processed: {}", self.days_processed);
        println!("Device Records Composed: {}", self.devices_composed);
        println!(
            "Fetches: {} attempted, {} failed",
            self.fetches_attempted, self.fetches_failed
        );
        println!("Samples Placed: {}", self.samples_placed);
        println!("All-Absent Records: {}", self.all_absent_records);
        println!("Join Ambiguities: {}", self.join_ambiguities);
        println!("Bounds Violations: {}", self.bounds_violations);
        println!("Values Imputed: {}", self.values_imputed);
        println!("Rows Written: {}", self.rows_written);

        if !self.processing_times.is_empty() {
            println!("\nProcessing Times:");
            let mut ops: Vec<_> = self.processing_times.iter().collect();
            ops.sort_by(|a, b| a.0.cmp(b.0));
            for (op, duration) in ops {
                println!("  {}: {:.2?}", op, duration);
            }
        }
        println!("=============================================\n");
    }
}

/// Time an expression and add the elapsed time under `$name`.
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $op:expr) => {{
        let start = std::time::Instant::now();
        let result = $op;
        $crate::metrics::METRICS
            .lock()
            .record_processing_time($name.to_string(), start.elapsed());
        result
    }};
}

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use field_pipeline::collector::DayCollector;
use field_pipeline::db::{create_pool, database_url_from_env};
use field_pipeline::db_operations::PgStore;
use field_pipeline::export::export_range;
use field_pipeline::fetch::JsonDirectorySource;
use field_pipeline::ingest::run_ingest;
use field_pipeline::metrics::METRICS;
use field_pipeline::parallel::days_in_range;
use field_pipeline::processing::run_processing;
use field_pipeline::{
    load_config, CsvStore, Outcome, PipelineConfig, PipelineError, RunSummary, Source, TableStore,
};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "field_pipeline")]
#[command(about = "Grid normalization, fusion and cleaning of field telemetry", long_about = None)]
struct Args {
    /// JSON configuration file (built-in site defaults when omitted)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct DateRange {
    /// First day, YYYY-MM-DD
    #[arg(long, short = 's')]
    start_date: NaiveDate,

    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long, short = 'e')]
    end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Csv,
    Postgres,
}

#[derive(clap::Args, Debug, Clone)]
struct StoreArgs {
    /// Where tables are read from and written to
    #[arg(long, value_enum, default_value_t = StoreKind::Csv)]
    store: StoreKind,

    /// PostgreSQL connection string (falls back to DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align stored measurement responses into per-day site files
    Collect {
        #[command(flatten)]
        range: DateRange,
    },
    /// Load per-day source files into the raw tables
    Ingest {
        #[command(flatten)]
        range: DateRange,
        /// Only this source (all raw sources when omitted)
        #[arg(long, value_enum)]
        source: Option<Source>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Clean raw tables into the processed tables
    Process {
        #[command(flatten)]
        range: DateRange,
        /// Only this source (all sources when omitted)
        #[arg(long, value_enum)]
        source: Option<Source>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Export one device's cleaned SP + AE record
    Export {
        #[command(flatten)]
        range: DateRange,
        /// Device to export (lowest device id when omitted)
        #[arg(long, short = 'd')]
        device_id: Option<String>,
        /// Output directory (configured output directory when omitted)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Ingest,
    Process,
}

async fn run_stage<S: TableStore>(
    store: &S,
    stage: Stage,
    config: &PipelineConfig,
    range: DateRange,
    sources: &[Source],
) -> Result<RunSummary, PipelineError> {
    match stage {
        Stage::Ingest => run_ingest(store, &config.data_dir, range.start_date, range.end_date, sources).await,
        Stage::Process => {
            run_processing(
                store,
                &config.data_dir,
                &config.climatology_dir,
                range.start_date,
                range.end_date,
                sources,
            )
            .await
        }
    }
}

async fn run_with_store(
    args: &StoreArgs,
    stage: Stage,
    config: &PipelineConfig,
    range: DateRange,
    sources: &[Source],
) -> Result<RunSummary, PipelineError> {
    match args.store {
        StoreKind::Csv => {
            let store = CsvStore::new(config.output_dir.join("tables"));
            run_stage(&store, stage, config, range, sources).await
        }
        StoreKind::Postgres => {
            let url = match &args.database_url {
                Some(url) => url.clone(),
                None => database_url_from_env()?,
            };
            let store = PgStore::new(create_pool(&url)?);
            run_stage(&store, stage, config, range, sources).await
        }
    }
}

async fn collect(config: &PipelineConfig, range: DateRange) -> Result<RunSummary, PipelineError> {
    let registry = config.registry()?;
    let source = JsonDirectorySource::new(config.measurement_dir.clone());
    let collector = DayCollector::new(&source, &registry, config)?;

    let mut summary = RunSummary::new();
    for date in days_in_range(range.start_date, range.end_date) {
        match collector.collect_day(date).await {
            Ok(day) => {
                day.write(&config.data_dir)?;
                summary.merge(day.summary);
            }
            Err(e) => {
                error!("Collection failed for {}: {}", date, e);
                summary.record(date, "collect", Outcome::Skipped(e.to_string()));
            }
        }
    }
    Ok(summary)
}

fn check_range(range: &DateRange) -> Result<(), PipelineError> {
    if range.start_date > range.end_date {
        return Err(PipelineError::Config(format!(
            "start date {} is after end date {}",
            range.start_date, range.end_date
        )));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides()?;
    config.validate()?;
    info!(
        "Site time zone {}, {}-minute grid, {} devices",
        config.timezone,
        config.interval_minutes,
        config.devices.len()
    );

    let summary = match args.command {
        Command::Collect { range } => {
            check_range(&range)?;
            collect(&config, range).await?
        }
        Command::Ingest { range, source, store } => {
            check_range(&range)?;
            let sources = source.map(|s| vec![s]).unwrap_or_else(|| Source::RAW.to_vec());
            run_with_store(&store, Stage::Ingest, &config, range, &sources).await?
        }
        Command::Process { range, source, store } => {
            check_range(&range)?;
            let sources = source.map(|s| vec![s]).unwrap_or_else(|| Source::ALL.to_vec());
            run_with_store(&store, Stage::Process, &config, range, &sources).await?
        }
        Command::Export {
            range,
            device_id,
            output_dir,
        } => {
            check_range(&range)?;
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let path = export_range(
                &config.data_dir,
                &output_dir,
                range.start_date,
                range.end_date,
                device_id.as_deref(),
            )?;
            println!("Export written to {}", path.display());
            RunSummary::new()
        }
    };

    METRICS.lock().print_summary();
    summary.print();
    Ok(())
}

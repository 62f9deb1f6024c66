use chrono::NaiveDate;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("Sampling interval of {0} minutes does not evenly divide a day")]
    InvalidInterval(u32),
    #[error("Local day {date} has no representable start in time zone {tz}")]
    UnrepresentableDay { date: NaiveDate, tz: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading data file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    CsvError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Error reading CSV headers in {path}: {source}")]
    HeaderReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Timestamp parsing error in {path} at row {row} for value '{value}' with format '{format}'")]
    TimestampParseError {
        path: PathBuf,
        row: usize,
        value: String,
        format: String,
    },
    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("Unable to parse a date from file name {path}")]
    FileNameDate { path: PathBuf },
    #[error("Invalid table built from {path}: {source}")]
    InvalidTable {
        path: PathBuf,
        #[source]
        source: TableError,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("Column '{column}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),
    #[error("Column '{0}' is not text")]
    NotText(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error reading measurements for component {component_id}: {source}")]
    IoError {
        component_id: String,
        #[source]
        source: io::Error,
    },
    #[error("Malformed measurement payload for component {component_id}: {source}")]
    DecodeError {
        component_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Source unavailable for component {component_id}: {message}")]
    Unavailable {
        component_id: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration loading failed: {0}")]
    Config(String),
    #[error("Configuration parsing failed: {0}")]
    ConfigParse(#[from] ConfigError),
    #[error("Parsing failed: {0}")]
    Parse(#[from] ParseError),
    #[error("Table operation failed: {0}")]
    Table(#[from] TableError),
    #[error("Grid construction failed: {0}")]
    Grid(#[from] GridError),
    #[error("Measurement fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Schema mismatch for '{table}': columns without a channel: {missing:?}, channels without a column: {extra:?}")]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error("Climatology reference unavailable: {0}")]
    Climatology(String),
    #[error("No input data for {source_name} between {start} and {end}")]
    NoData {
        source_name: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Device '{0}' not found in the input data")]
    UnknownDevice(String),
    #[error("Database pool creation error: {0}")]
    DbPoolError(String),
    #[error("Database operation failed: {0}")]
    DbQueryError(#[from] tokio_postgres::Error),
    #[error("Failed to get database connection from pool: {0}")]
    DbConnectionError(#[from] deadpool_postgres::PoolError),
    #[error("Storage IO error on {path}: {source}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

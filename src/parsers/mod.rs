pub mod csv_table;
pub mod power_quality;

pub use csv_table::{read_table_csv, write_table_csv, CsvTableOptions};
pub use power_quality::load_power_quality_csv;

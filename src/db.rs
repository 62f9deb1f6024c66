use crate::errors::PipelineError;
use deadpool_postgres::{Config, Pool, Runtime};
use log::info;
use std::env;
use tokio_postgres::NoTls;

pub type DbPool = Pool;

/// Connection URL from `DATABASE_URL`.
pub fn database_url_from_env() -> Result<String, PipelineError> {
    env::var("DATABASE_URL")
        .map_err(|_| PipelineError::Config("DATABASE_URL environment variable not set".to_string()))
}

/// Deadpool PostgreSQL pool for `database_url`. Connections are opened
/// lazily on first use.
pub fn create_pool(database_url: &str) -> Result<DbPool, PipelineError> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| PipelineError::DbPoolError(format!("Failed to create database pool: {}", e)))?;

    info!("Created database connection pool");
    Ok(pool)
}

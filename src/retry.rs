use log::{error, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for a retried async operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, given the delay used before `attempt`.
    fn next_delay(&self, current: Duration) -> Duration {
        let grown = Duration::from_millis((current.as_millis() as f64 * self.exponential_base) as u64);
        grown.min(self.max_delay)
    }

    /// Sleeps between consecutive attempts, one fewer than `max_attempts`.
    pub fn delays(&self) -> Vec<Duration> {
        let gaps = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.initial_delay.min(self.max_delay)), |d| {
            Some(self.next_delay(*d))
        })
        .take(gaps)
        .collect()
    }
}

/// Run `operation` with exponential backoff while it fails with an error
/// `retryable` accepts. Any other error, or the last one once
/// `config.max_attempts` is spent, is returned as is.
pub async fn retry_if<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut delays = config.delays().into_iter();
    let mut attempt = 1;
    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    warn!("'{}' succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(error) => error,
        };
        if !retryable(&error) {
            return Err(error);
        }
        let Some(delay) = delays.next() else {
            error!("'{}' gave up after {} attempts: {}", operation_name, attempt, error);
            return Err(error);
        };
        warn!(
            "'{}' failed (attempt {}/{}): {}. Retrying in {:?}",
            operation_name, attempt, config.max_attempts, error, delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// [`retry_if`] retrying every error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(config, operation_name, operation, |_| true).await
}

/// Measurement API fetches: a handful of quick retries.
pub fn fetch_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        initial_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(8),
        exponential_base: 2.0,
    }
}

pub fn db_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(30),
        exponential_base: 2.0,
    }
}

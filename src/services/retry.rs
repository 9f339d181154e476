//! Bounded replay of transactions that failed on contention

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::{
    config::InventoryConfig,
    error::{AppError, AppResult},
};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &InventoryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt` until it succeeds, fails with a non-transient error, or
    /// the attempt budget is spent. Each call must open its own transaction.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && tries < self.max_attempts => {
                    tracing::warn!(
                        "{}: transient storage failure on attempt {}/{}: {}",
                        operation,
                        tries,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.delay(tries)).await;
                    tries += 1;
                }
                Err(e) => {
                    match &e {
                        AppError::Storage(_) => {
                            tracing::error!("{} failed after {} attempt(s): {}", operation, tries, e)
                        }
                        AppError::Conflict(_) => {
                            tracing::error!("{} hit a stock invariant conflict: {}", operation, e)
                        }
                        _ => tracing::debug!("{} rejected: {}", operation, e),
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Linear backoff with up to one extra step of jitter
    fn delay(&self, tries: u32) -> Duration {
        let step = self.backoff.as_millis() as u64;
        let jitter = if step == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=step)
        };
        Duration::from_millis(step * u64::from(tries) + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&InventoryConfig::default())
    }
}

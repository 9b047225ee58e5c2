use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::error::{Result, WalletError};

/// Retry policy for idempotent reads against remote services.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
    /// Additional attempts after the first
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retries are used up. A timed-out attempt counts as `Unavailable`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(WalletError::Unavailable(format!(
                    "{label} timed out after {:?}",
                    self.attempt_timeout
                ))),
            };
            match outcome {
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        "{} failed: {}. Retrying ({}/{})",
                        label, e, retries, self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }
}

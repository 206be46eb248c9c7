//! Retry with capped exponential backoff.

use std::future::Future;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::RetryPolicy;
use crate::error::Result;

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// Every error is retried; callers decide what is worth wrapping. Returns
/// the last error when all attempts fail.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = operation_name,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    operation = operation_name,
                    error = %e,
                    attempts = attempt,
                    "operation failed after all retries"
                );
                return Err(e);
            }
        }
    }
}

use crate::config::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Calculate the delay before retry number `attempt`.
///
/// Jittered exponential backoff: a uniform draw from
/// `[0, 2^attempt - 1]` seconds, capped at `max_ms`.
pub fn next_retry_delay(attempt: u32, max_ms: u64) -> Duration {
    let ceiling = 2_u64.saturating_pow(attempt).saturating_sub(1);
    let secs = if ceiling == 0 {
        0
    } else {
        rand::random::<u64>() % (ceiling + 1)
    };
    Duration::from_millis(secs.saturating_mul(1000).min(max_ms))
}

/// Execute an async operation with retries.
///
/// `is_retryable` classifies failures: a terminal error propagates
/// immediately, a retryable one is re-attempted after a backoff sleep,
/// up to `settings.max_attempts` total attempts. The backoff sleep is a
/// legal cancellation point for callers driving this future.
pub async fn retry_async<T, E, F, Fut, C>(
    operation_name: &str,
    settings: RetrySettings,
    is_retryable: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                attempt += 1;
                if attempt >= settings.max_attempts {
                    error!(
                        "Failed to execute '{}' after {} attempts: {}",
                        operation_name, settings.max_attempts, e
                    );
                    return Err(e);
                }
                let delay = next_retry_delay(attempt, settings.max_delay_ms);
                if !settings.quiet {
                    warn!(
                        "Operation '{}' failed. Retrying in {:?} (Attempt {}/{}): {}",
                        operation_name, delay, attempt, settings.max_attempts, e
                    );
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

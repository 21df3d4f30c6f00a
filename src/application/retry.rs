//! Bounded retries with linear backoff.

use crate::config::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Run `op` until it succeeds, `retryable` says no, or the policy runs out.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts && retryable(&e) => {
                let delay = policy.delay * attempt;
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// Retrying dispatcher: fixed-count exponential backoff around one async
// operation.
//
// The policy is deliberately blunt: every failure is retried the same way,
// with no jitter and no status classification, and the delay simply grows by
// a fixed factor after each failed attempt. The final attempt's error is
// handed back to the caller untouched.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Retry configuration for [`call_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    // 5 attempts with delays of 1000, 2000, 4000 and 8000 ms between them.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2,
        }
    }
}

/// Runs `operation`, retrying with exponential backoff until it succeeds or
/// the attempt budget is exhausted.
///
/// The first success is returned immediately, skipping any remaining
/// attempts. Once the final attempt has failed, its error is propagated; no
/// delay is slept after it. Each retry emits a `warn` log naming `label`,
/// the attempt count and the upcoming delay.
pub async fn call_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // A zero-attempt budget would mean never running the operation; treat it
    // as a single attempt instead.
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => return Err(error),
            Err(error) => {
                log::warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    label,
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    error
                );
                tokio::time::sleep(delay).await;
                delay *= policy.backoff_multiplier;
                attempt += 1;
            }
        }
    }
}

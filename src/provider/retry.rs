use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for external model calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: base_backoff.max(Duration::from_millis(50)),
            max_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(10))
    }
}

/// Run `call` until it succeeds, the error is terminal, or the attempt cap
/// is reached. Rate limits honor the server-suggested wait when present;
/// everything else doubles from the base backoff up to the cap.
pub async fn with_retry<T, Make, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut call: Make,
) -> Result<T, ProviderError>
where
    Make: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = policy.base_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(what, attempt, "call recovered after retries");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let wait = err.retry_after().unwrap_or(backoff).min(policy.max_backoff);
                tracing::warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    wait_ms = wait.as_millis() as u64,
                    "call failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff = backoff.saturating_mul(2).min(policy.max_backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

//! Exponential-backoff retry wrapper for Exchange Port calls. Only errors
//! classified transient are retried; everything else surfaces
//! immediately. Total elapsed time is bounded by `max_attempts`.

use std::future::Future;
use std::time::Duration;

use crate::error::ExchangeError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default policy for reads: 3 attempts, 1 s base delay.
    pub fn reads() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }

    /// Default policy for leverage changes: 2 attempts, 0.5 s base delay.
    pub fn leverage() -> Self {
        Self { max_attempts: 2, base_delay: Duration::from_millis(500) }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt)
    }
}

/// Runs `f`, retrying up to `policy.max_attempts` times with exponential
/// backoff when the returned error is transient. Non-transient errors (auth,
/// bad symbol, insufficient balance) are returned on the first attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut f: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "transient exchange error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) };
        let result = with_retry(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExchangeError::Network { operation: "test".into(), message: "reset".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::reads();
        let result: Result<(), _> = with_retry(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::Auth("bad key".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

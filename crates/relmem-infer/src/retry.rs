//! Shared exponential-backoff retry for inference calls.

use std::time::Duration;

use crate::error::{Result, is_retryable};

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors. Non-retryable errors are returned
/// immediately. A rate-limit response with a provider-specified wait uses
/// that wait instead of the computed backoff.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    what: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                let wait = match &e {
                    crate::error::InferError::RateLimited {
                        retry_after: Some(d),
                        ..
                    } => *d,
                    _ => backoff,
                };
                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        what,
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms = wait.as_millis() as u64,
                        "Inference call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(InferError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferError::Timeout(Duration::from_secs(1)))
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(5, Duration::from_millis(1), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferError::Config("missing key".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Transient Failure Retry
//!
//! Retry policy for registry operations: exponential backoff starting at
//! 500ms, doubling up to a cap of 8s, at most 5 attempts. Only transient
//! failures (connection resets, 5xx, 429, 408) are retried; every other
//! error returns immediately.

use crate::registry::{RegistryError, Result};
use std::time::Duration;
use tokio::time::sleep;

/// First backoff delay
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Total attempts before giving up
const MAX_ATTEMPTS: u32 = 5;

/// Run `operation`, retrying transient failures with exponential backoff.
/// Exhausting the attempts surfaces `NetworkExhausted` carrying the last
/// transient failure.
pub async fn retry_transient<F, T, Fut>(mut operation: F, description: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", description, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    description,
                    attempt,
                    MAX_ATTEMPTS,
                    e,
                    backoff
                );

                sleep(backoff).await;
                attempt += 1;
                backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
            }
            Err(e) if e.is_transient() => {
                tracing::error!("{} failed after {} attempts: {}", description, attempt, e);
                return Err(RegistryError::NetworkExhausted {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result = retry_transient(|| async { Ok::<i32, RegistryError>(42) }, "immediate").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_transient(
            || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(RegistryError::NetworkTransient("HTTP 503".to_string()))
                    } else {
                        Ok(100)
                    }
                }
            },
            "transient then success",
        )
        .await;

        assert_eq!(result.unwrap(), 100);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let result = retry_transient(
            || async {
                Err::<i32, RegistryError>(RegistryError::NetworkTransient(
                    "connection reset".to_string(),
                ))
            },
            "always failing",
        )
        .await;

        match result.unwrap_err() {
            RegistryError::NetworkExhausted { attempts, last } => {
                assert_eq!(attempts, MAX_ATTEMPTS);
                assert!(last.contains("connection reset"));
            }
            other => panic!("expected NetworkExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_transient(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, RegistryError>(RegistryError::DigestMismatch {
                        expected: "sha256:aa".to_string(),
                        actual: "sha256:bb".to_string(),
                    })
                }
            },
            "fatal",
        )
        .await;

        assert!(matches!(
            result.unwrap_err(),
            RegistryError::DigestMismatch { .. }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

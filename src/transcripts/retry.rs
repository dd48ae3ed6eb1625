use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bigquery::BigQueryError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

/// Per-region retry policy: only transient errors are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

/// Why a retried call stopped without a result.
#[derive(Debug)]
pub enum RetryStop {
    Failed(BigQueryError),
    Cancelled,
}

impl RetryPolicy {
    /// Equal jitter backoff: base/2 + rand(0, base/2).
    fn backoff(&self, attempt: u32) -> Duration {
        let base = (self.initial_backoff.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(attempt));
        let half = base / 2;
        Duration::from_millis(half + fastrand::u64(..half.max(1)))
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts, or `cancel` fires.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut call: F) -> Result<T, RetryStop>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BigQueryError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryStop::Cancelled),
                r = tokio::time::timeout(self.attempt_timeout, call()) => r
                    .unwrap_or_else(|_| Err(BigQueryError::Timeout(self.attempt_timeout))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryStop::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(RetryStop::Failed(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_stays_within_equal_jitter_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..3 {
            let base = 1000 * 2u64.pow(attempt);
            let delay = policy.backoff(attempt).as_millis() as u64;
            assert!(delay >= base / 2 && delay < base, "attempt {attempt}: {delay}");
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run(&CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BigQueryError::RateLimited("slow down".into()))
                } else {
                    Ok("rows")
                }
            })
            .await;

        assert!(matches!(result, Ok("rows")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(2)
            .run(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BigQueryError::Api {
                    code: 503,
                    message: "unavailable".into(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryStop::Failed(BigQueryError::Api { code: 503, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .run(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BigQueryError::PermissionDenied("Access Denied".into()))
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryStop::Failed(BigQueryError::PermissionDenied(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            attempt_timeout: Duration::from_millis(20),
            initial_backoff: Duration::from_millis(1),
        };
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryStop::Failed(BigQueryError::Timeout(_)))
        ));
    }

    fn cancel_after(delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(delay).await;
                cancel.cancel();
            }
        });
        cancel
    }

    #[tokio::test]
    async fn cancel_during_slow_call_aborts_it() {
        let policy = RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(1),
        };
        let cancel = cancel_after(Duration::from_millis(50));
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .run(&cancel, || async {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RetryStop::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancel_during_backoff_skips_next_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(20),
        };
        let calls = AtomicU32::new(0);
        let cancel = cancel_after(Duration::from_millis(50));
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BigQueryError::RateLimited("slow down".into()))
            })
            .await;

        assert!(matches!(result, Err(RetryStop::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_in_flight_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = fast_policy(3)
            .run(&cancel, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RetryStop::Cancelled)));
    }
}

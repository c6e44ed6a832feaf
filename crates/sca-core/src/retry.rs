//! Retry policy shared by every remote call.
//!
//! Two budgets are kept apart: transient failures consume a fixed number of
//! attempts with exponential backoff, while server rate limits are waited out
//! without ever touching the attempt count.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Classification of one failed request attempt.
#[derive(Debug)]
pub enum RequestError {
    /// Server asked us to slow down; `retry_after` is its suggested wait.
    RateLimited { retry_after: Option<Duration> },
    /// Connection failure, timeout or unexpected HTTP status.
    Transient(String),
    /// Anything retrying cannot fix (malformed payload, bad request building).
    Fatal(Error),
}

/// Result of a well-formed API call: a payload, or a rejection reported by the
/// platform itself (`ok: false`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiOutcome<T> {
    Ok(T),
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub default_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            default_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following failed attempt number `failed` (1-based).
    pub fn backoff_after(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }

    /// Run `op` until it succeeds, fails fatally, exhausts the attempt budget,
    /// or `cancel` fires. `label` only feeds the logs.
    pub async fn run<T, F, Fut>(&self, label: &str, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut failed = 0u32;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = op() => r,
            };

            match outcome {
                Ok(v) => return Ok(v),
                Err(RequestError::Fatal(e)) => return Err(e),
                Err(RequestError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(self.default_rate_limit_wait);
                    tracing::warn!(
                        call = label,
                        delay_s = wait.as_secs_f64(),
                        "rate limited; waiting before retrying"
                    );
                    pause(cancel, wait).await?;
                }
                Err(RequestError::Transient(reason)) => {
                    failed += 1;
                    tracing::warn!(
                        call = label,
                        attempt = failed,
                        max_attempts = self.max_attempts,
                        error = %reason,
                        "request failed"
                    );
                    if failed >= self.max_attempts {
                        return Err(Error::RetriesExhausted {
                            attempts: failed,
                            last: reason,
                        });
                    }
                    pause(cancel, self.backoff_after(failed)).await?;
                }
            }
        }
    }
}

/// Sleep that gives up as soon as the run is cancelled.
pub async fn pause(cancel: &CancellationToken, wait: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(wait) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles_from_one_second() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_after(1), Duration::from_secs(1));
        assert_eq!(p.backoff_after(2), Duration::from_secs(2));
        assert_eq!(p.backoff_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_does_not_consume_attempts() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let v = p
            .run("test", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(RequestError::RateLimited {
                            retry_after: Some(Duration::from_secs(7)),
                        }),
                        _ => Ok("done"),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(v, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_hint_waits_default() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        // Many rate limits followed by transient failures: only the transient ones count.
        p.run("test", &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0..=4 => Err(RequestError::RateLimited { retry_after: None }),
                    5 | 6 => Err(RequestError::Transient("reset".to_string())),
                    _ => Ok(()),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(start.elapsed(), Duration::from_secs(5 * 60 + 1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_exhaust_budget() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let err = p
            .run("test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Transient("connection refused".to_string())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff; no sleep after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = p
            .run("test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestError::Fatal(Error::External("bad json".to_string()))) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::External(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_rate_limit_wait() {
        let p = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = p
            .run("test", &cancel, || async {
                Err::<(), _>(RequestError::RateLimited { retry_after: None })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}

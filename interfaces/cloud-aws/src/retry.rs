//! Centralized retry policy for every AWS call this crate makes (§7
//! "Retry policy is centralized, not duplicated per call site").
//!
//! One policy object built on the `backoff` crate so every adapter function
//! gets the same exponential-backoff-with-jitter behavior and the same
//! transient/permanent split, instead of each call site hand-rolling its
//! own poll-and-sleep loop.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use cloud_traits::CloudError;
use tracing::{debug, warn};

/// Exponential backoff bounds applied uniformly to every retryable AWS
/// call. `max_elapsed` bounds total wall time per call, not per attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(20),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    /// Runs `op` under the policy. `op` must classify its own errors as
    /// `backoff::Error::Permanent` (no retry, e.g. validation/auth errors)
    /// or `backoff::Error::Transient` (retryable, e.g. throttling) — the
    /// call sites in `ec2.rs`/`route53.rs` make that call, this function
    /// only drives the clock.
    pub async fn run<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, CloudError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, backoff::Error<CloudError>>>,
    {
        let mut backoff = self.backoff();
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(backoff::Error::Permanent(err)) => return Err(err),
                Err(backoff::Error::Transient { err, retry_after }) => {
                    let wait = retry_after.or_else(|| backoff.next_backoff());
                    match wait {
                        Some(delay) => {
                            warn!(call = label, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient AWS error");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            debug!(call = label, "retry budget exhausted");
                            return Err(CloudError::Transient(err.to_string()));
                        }
                    }
                }
            }
        }
    }
}

/// Classifies an EC2/Route 53 SDK error as transient (throttling, internal
/// server error, connection reset) or permanent (everything else). Used by
/// `ec2.rs`/`route53.rs` call sites to decide how to wrap errors before
/// handing them to `RetryPolicy::run`.
pub fn is_transient_code(code: &str) -> bool {
    matches!(
        code,
        "RequestLimitExceeded"
            | "Throttling"
            | "ThrottlingException"
            | "InternalError"
            | "InternalFailure"
            | "ServiceUnavailable"
            | "PriorRequestNotComplete"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::default();
        let result: Result<u32, CloudError> = policy
            .run("test", || async { Ok::<_, backoff::Error<CloudError>>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let policy = RetryPolicy::default();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, CloudError> = policy
            .run("test", || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err(backoff::Error::Permanent(CloudError::Rejected {
                        code: "InvalidParameter".into(),
                        message: "bad request".into(),
                    }))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_retries_until_success() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(5),
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, CloudError> = policy
            .run("test", || {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(backoff::Error::transient(CloudError::Transient(
                            "throttled".into(),
                        )))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}

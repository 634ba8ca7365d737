//! Exponential-backoff retry for asynchronous operations.
//!
//! The retry layer absorbs transient failures before they reach the
//! session store: every attempt's error is inspected against a retry
//! condition, delays grow exponentially with jitter, and the final result
//! is reported as a record rather than a bare `Err` so callers always see
//! how many attempts were spent.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Backoff policy for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling the exponential growth stops at.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Policy for ordinary network requests.
    pub const NETWORK: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_millis(10_000),
        backoff_factor: 2.0,
    };

    /// Policy for lightweight operations that should fail fast.
    pub const QUICK: RetryPolicy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_millis(2_000),
        backoff_factor: 1.5,
    };

    /// Policy for operations important enough to keep trying for minutes.
    pub const PERSISTENT: RetryPolicy = RetryPolicy {
        max_retries: 10,
        base_delay: Duration::from_millis(3_000),
        max_delay: Duration::from_millis(60_000),
        backoff_factor: 1.8,
    };

    /// Delay before retry number `attempt` (0-based), without jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        let raw = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::NETWORK
    }
}

/// Extra knobs for a retried operation.
pub struct RetryOptions<'a> {
    /// Decides whether an error is worth another attempt.
    /// Defaults to [`Error::is_retryable`].
    pub retry_condition: Option<&'a (dyn Fn(&Error) -> bool + Send + Sync)>,

    /// Invoked before each retry with the 1-based retry number and the
    /// error that triggered it.
    pub on_retry: Option<&'a (dyn Fn(u32, &Error) + Send + Sync)>,

    /// Checked before every backoff sleep; cancellation stops the loop
    /// with an `Abort` error instead of burning further attempts.
    pub cancel: Option<&'a CancellationToken>,
}

impl Default for RetryOptions<'_> {
    fn default() -> Self {
        Self {
            retry_condition: None,
            on_retry: None,
            cancel: None,
        }
    }
}

/// The result record of a retried operation.
///
/// Never an `Err` at the outer layer: the last error, if all attempts
/// failed, rides inside `result`, alongside the attempt count and elapsed
/// time, and the caller decides whether that is fatal.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The final result: the first success, or the last error.
    pub result: Result<T>,
    /// How many times the operation ran.
    pub attempts: u32,
    /// Wall-clock time spent across all attempts and delays.
    pub total_time: Duration,
}

impl<T> RetryOutcome<T> {
    /// True when the operation eventually succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs `op` under the given policy, retrying on retryable failures.
pub async fn execute_with_retry<T, F, Fut>(
    mut op: F,
    policy: RetryPolicy,
    options: RetryOptions<'_>,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = tokio::time::Instant::now();
    let mut attempts = 0u32;
    let mut last_error: Option<Error> = None;

    for attempt in 0..=policy.max_retries {
        attempts = attempt + 1;

        match op().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    total_time: started.elapsed(),
                };
            }
            Err(err) => {
                let out_of_attempts = attempt == policy.max_retries;
                let should_retry = match options.retry_condition {
                    Some(condition) => condition(&err),
                    None => err.is_retryable(),
                };

                if out_of_attempts || !should_retry {
                    last_error = Some(err);
                    break;
                }

                warn!(attempt = attempt + 1, error = %err, "retrying after failure");
                if let Some(on_retry) = options.on_retry {
                    on_retry(attempt + 1, &err);
                }
                last_error = Some(err);

                let delay = policy.delay_for_attempt(attempt) + jitter();
                if let Some(cancel) = options.cancel {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return RetryOutcome {
                                result: Err(Error::abort("retry cancelled")),
                                attempts,
                                total_time: started.elapsed(),
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    RetryOutcome {
        result: Err(last_error.unwrap_or_else(|| Error::unknown("retry loop produced no error"))),
        attempts,
        total_time: started.elapsed(),
    }
}

/// Runs `op` with one fast retry first, then the standard backoff policy.
///
/// The quick phase covers transient blips without incurring full backoff
/// latency; only if it fails does the standard phase spin up.
pub async fn smart_retry<T, F, Fut>(mut op: F, options: RetryOptions<'_>) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let quick = RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_millis(500),
        backoff_factor: 1.0,
    };

    let quick_options = RetryOptions {
        retry_condition: options.retry_condition,
        on_retry: options.on_retry,
        cancel: options.cancel,
    };
    let quick_outcome = execute_with_retry(&mut op, quick, quick_options).await;
    if quick_outcome.is_success() || matches!(quick_outcome.result, Err(Error::Abort { .. })) {
        return quick_outcome;
    }

    let standard = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(2_000),
        max_delay: Duration::from_millis(15_000),
        backoff_factor: 2.0,
    };

    let standard_outcome = execute_with_retry(&mut op, standard, options).await;
    RetryOutcome {
        result: standard_outcome.result,
        attempts: quick_outcome.attempts + standard_outcome.attempts,
        total_time: quick_outcome.total_time + standard_outcome.total_time,
    }
}

/// Random jitter up to one second, so a fleet of clients does not retry in
/// lockstep.
fn jitter() -> Duration {
    Duration::from_millis(rand::random::<u64>() % 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tiny(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome = execute_with_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            },
            tiny(3),
            RetryOptions::default(),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_attempts_n_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = execute_with_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::connection("refused", None))
                }
            },
            tiny(3),
            RetryOptions::default(),
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_error_attempts_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = execute_with_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::bad_request("malformed", None))
                }
            },
            tiny(5),
            RetryOptions::default(),
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome = execute_with_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(Error::timeout("slow", None))
                    } else {
                        Ok("finally")
                    }
                }
            },
            tiny(5),
            RetryOptions::default(),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_sees_each_retry() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        let on_retry = move |attempt: u32, _err: &Error| {
            seen2.store(attempt, Ordering::SeqCst);
        };

        let outcome: RetryOutcome<()> = execute_with_retry(
            || async { Err(Error::internal_server("boom")) },
            tiny(2),
            RetryOptions {
                on_retry: Some(&on_retry),
                ..RetryOptions::default()
            },
        )
        .await;

        assert!(!outcome.is_success());
        // Two retries fired; the last one was number 2.
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_condition_overrides_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let never = |_: &Error| false;

        let outcome: RetryOutcome<()> = execute_with_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::internal_server("boom"))
                }
            },
            tiny(5),
            RetryOptions {
                retry_condition: Some(&never),
                ..RetryOptions::default()
            },
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome: RetryOutcome<()> = execute_with_retry(
            || async { Err(Error::connection("refused", None)) },
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
                backoff_factor: 1.0,
            },
            RetryOptions {
                cancel: Some(&cancel),
                ..RetryOptions::default()
            },
        )
        .await;

        assert!(matches!(outcome.result, Err(Error::Abort { .. })));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_retry_quick_phase_wins() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome = smart_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(Error::timeout("blip", None))
                    } else {
                        Ok("recovered")
                    }
                }
            },
            RetryOptions::default(),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_retry_does_not_retry_session_expired() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = smart_retry(
            move || {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::session_expired("please resend"))
                }
            },
            RetryOptions::default(),
        )
        .await;

        assert!(!outcome.is_success());
        // One attempt per phase: the error is non-retryable in both.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(outcome.result, Err(Error::SessionExpired { .. })));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(4_000),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(4_000));
    }
}

/// Retry with bounded exponential backoff.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::result::ExecutionResult;

/// Error fragments that usually mean "try again later".
const TRANSIENT_ERRORS: [&str; 7] = [
    "timeout",
    "connection refused",
    "connection reset",
    "broken pipe",
    "no route to host",
    "network unreachable",
    "temporarily unavailable",
];

/// Whether an error message looks transient.
///
/// Advisory only: [`RetryPolicy::run`] retries every failure regardless.
pub fn should_retry_error(error: &str) -> bool {
    let error = error.to_lowercase();
    TRANSIENT_ERRORS.iter().any(|fragment| error.contains(fragment))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    /// Log retry attempts at warn instead of debug.
    pub verbose: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            verbose: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Total number of attempts, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delays slept between attempts; one fewer than [`Self::attempts`].
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay), move |delay| {
            Some(self.next_delay(*delay))
        })
        .take(self.max_retries as usize)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = delay.as_secs_f64() * self.backoff_factor;
        if !next.is_finite() || next >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(next.max(0.0))
        }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// An `Err` from the operation counts as a failed attempt with exit code
    /// -1. Returns the first success, or the result of the last attempt.
    pub async fn run<F, Fut, E>(&self, host: &str, mut operation: F) -> ExecutionResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<ExecutionResult, E>>,
        E: Display,
    {
        let attempts = self.attempts();
        let mut delay = self.initial_delay;
        let mut last_result = None;

        for attempt in 0..attempts {
            let result = match operation(attempt).await {
                Ok(result) => result,
                Err(e) => ExecutionResult::failed(host, e.to_string()),
            };

            if result.is_success() {
                if attempt > 0 {
                    log::info!(
                        "'{}' succeeded on attempt {}/{}",
                        host,
                        attempt + 1,
                        attempts
                    );
                }
                return result;
            }

            if attempt + 1 < attempts {
                let message = format!(
                    "'{}' failed (attempt {}/{}): {}, retrying in {:.1}s...",
                    host,
                    attempt + 1,
                    attempts,
                    result.error_text().trim(),
                    delay.as_secs_f64()
                );
                if self.verbose {
                    log::warn!("{}", message);
                } else {
                    log::debug!("{}", message);
                }

                tokio::time::sleep(delay).await;
                delay = self.next_delay(delay);
            }

            last_result = Some(result);
        }

        if attempts > 1 {
            log::error!("'{}' failed after {} attempts", host, attempts);
        }

        last_result.unwrap_or_else(|| ExecutionResult::failed(host, "All retry attempts failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::CommandOutput;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok(host: &str) -> ExecutionResult {
        ExecutionResult::completed(
            host,
            CommandOutput {
                stdout: b"ok".to_vec(),
                stderr: Vec::new(),
                exit_status: Some(0),
            },
        )
    }

    #[test]
    fn test_should_retry_error() {
        assert!(should_retry_error("Connection refused (os error 111)"));
        assert!(should_retry_error("operation TIMEOUT"));
        assert!(should_retry_error("Resource temporarily unavailable"));
        assert!(!should_retry_error("Permission denied (publickey)"));
        assert!(!should_retry_error(""));
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = RetryPolicy::new(6)
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_factor(2.0)
            .with_max_delay(Duration::from_secs(10));

        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);

        for pair in policy.delays().collect::<Vec<_>>().windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!(pair[1] <= policy.max_delay);
        }
    }

    #[test]
    fn test_no_delays_without_retries() {
        assert_eq!(RetryPolicy::new(0).delays().count(), 0);
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_every_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2).with_initial_delay(Duration::from_millis(10));

        let result = policy
            .run("web01", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(ExecutionResult::failed("web01", "boom")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_failure_not_first() {
        let policy = RetryPolicy::new(2).with_initial_delay(Duration::from_millis(10));

        let result = policy
            .run("web01", |attempt| async move {
                Ok::<_, String>(ExecutionResult::failed(
                    "web01",
                    format!("attempt {}", attempt),
                ))
            })
            .await;

        assert_eq!(result.error(), Some("attempt 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try_never_sleeps() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);

        let result = RetryPolicy::new(5)
            .run("web01", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(ok("web01")) }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_become_failing_results_and_recover() {
        let result = RetryPolicy::new(3)
            .run("web01", |attempt| async move {
                if attempt < 2 {
                    Err("connection reset by peer".to_string())
                } else {
                    Ok(ok("web01"))
                }
            })
            .await;

        assert!(result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_on_last_attempt_is_returned() {
        let result = RetryPolicy::new(1)
            .with_initial_delay(Duration::from_millis(1))
            .run("web01", |_| async { Err::<ExecutionResult, _>("broken pipe") })
            .await;

        assert!(!result.is_success());
        assert_eq!(result.exit_code(), -1);
        assert_eq!(result.error(), Some("broken pipe"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_only_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_factor(2.0)
            .with_max_delay(Duration::from_secs(3));

        policy
            .run("web01", |_| async {
                Ok::<_, String>(ExecutionResult::failed("web01", "down"))
            })
            .await;

        // 1 + 2 + 3 (capped), nothing after the fourth attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(7), "{:?}", elapsed);
    }
}

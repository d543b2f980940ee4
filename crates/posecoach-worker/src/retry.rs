//! Bounded exponential backoff for the terminal status write, and log
//! throttling for repeated queue poll failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry budget for one operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Retries after the first attempt
    pub retries: u32,
    pub initial: Duration,
    pub ceiling: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retries: 5,
            initial: Duration::from_millis(500),
            ceiling: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    pub fn new(retries: u32, initial: Duration) -> Self {
        Self {
            retries,
            initial,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based).
    fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.ceiling)
    }
}

/// The last error of an operation that never succeeded.
#[derive(Debug, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with an error `retryable`
/// rejects, or the budget runs out.
pub async fn retry_when<T, E, F, Fut, P>(
    backoff: &Backoff,
    label: &str,
    retryable: P,
    operation: F,
) -> Result<T, Exhausted<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempts <= backoff.retries && retryable(&e) => {
                let delay = backoff.delay(attempts);
                warn!(attempt = attempts, ?delay, "{} failed, retrying: {}", label, e);
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(Exhausted { error, attempts }),
        }
    }
}

/// Counts consecutive queue poll failures and stops logging each one
/// after `loud_limit`.
#[derive(Debug)]
pub struct PollFailures {
    streak: u32,
    loud_limit: u32,
}

impl PollFailures {
    pub fn new(loud_limit: u32) -> Self {
        Self { streak: 0, loud_limit }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn succeeded(&mut self) {
        if self.streak > self.loud_limit {
            warn!(failures = self.streak, "Queue poll recovered");
        }
        self.streak = 0;
    }

    /// Log `err` unless the streak is already past the limit. Returns
    /// whether it was logged at error level.
    pub fn failed(&mut self, err: &impl Display) -> bool {
        self.streak += 1;
        if self.streak <= self.loud_limit {
            error!(failures = self.streak, "Queue poll failed: {}", err);
            true
        } else {
            if self.streak == self.loud_limit + 1 {
                warn!("Further poll failures logged at debug until the queue recovers");
            }
            debug!(failures = self.streak, "Queue poll failed: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_up_to_ceiling() {
        let backoff = Backoff::new(5, Duration::from_millis(100));

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_poll_failures_go_quiet_then_reset() {
        let mut failures = PollFailures::new(2);

        assert!(failures.failed(&"unavailable"));
        assert!(failures.failed(&"unavailable"));
        assert!(!failures.failed(&"unavailable"));
        assert_eq!(failures.streak(), 3);

        failures.succeeded();
        assert_eq!(failures.streak(), 0);
        assert!(failures.failed(&"unavailable"));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let backoff = Backoff::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_when(&backoff, "write", |_: &&str| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("503")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_runs_out() {
        let backoff = Backoff::new(2, Duration::from_millis(1));

        let result = retry_when(&backoff, "write", |_: &&str| true, || async { Err::<(), _>("503") }).await;
        assert_eq!(
            result,
            Err(Exhausted {
                error: "503",
                attempts: 3
            })
        );
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let backoff = Backoff::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_when(&backoff, "write", |e: &&str| *e != "illegal transition", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("illegal transition") }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Backoff for transient Firestore failures (transport errors, 429, 5xx).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info_span, warn, Instrument};

use crate::error::FirestoreResult;
use crate::metrics::record_retry;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// `FIRESTORE_RETRY_MAX_ATTEMPTS`, `FIRESTORE_RETRY_BASE_MS` and
    /// `FIRESTORE_RETRY_MAX_MS`, each falling back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |name: &str, fallback: Duration| {
            parsed(name).map(Duration::from_millis).unwrap_or(fallback)
        };
        Self {
            max_retries: parsed("FIRESTORE_RETRY_MAX_ATTEMPTS").unwrap_or(defaults.max_retries),
            base: millis("FIRESTORE_RETRY_BASE_MS", defaults.base),
            cap: millis("FIRESTORE_RETRY_MAX_MS", defaults.cap),
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// A Retry-After hint is used as is. Otherwise the wait is drawn from
    /// `[base, min(base * 2^attempt, cap)]`.
    pub fn delay_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(ms) = retry_after_ms {
            return Duration::from_millis(ms);
        }
        let ceiling = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap)
            .max(self.base);
        let spread = ceiling - self.base;
        self.base + spread.mul_f64(jitter())
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Value in [0, 1) taken from the clock's sub-second nanos.
fn jitter() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1024) / 1024.0
}

/// Run `op` under `config`, retrying only errors that are retryable.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = FirestoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        let span = info_span!("firestore_retry", operation = %operation, attempt = attempt + 1);
        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt, e.retry_after_ms());
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore call failed, backing off: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

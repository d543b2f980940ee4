//! Scoped deadlines for external calls.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Run one pipeline stage under `limit`, recording its duration.
pub async fn run_stage<T, F>(stage: &'static str, limit: Duration, fut: F) -> WorkerResult<T>
where
    F: Future<Output = WorkerResult<T>>,
{
    let started = Instant::now();
    let result = tokio::time::timeout(limit, fut).await;
    let elapsed = started.elapsed();
    metrics::record_stage(stage, elapsed);
    debug!(stage, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");

    match result {
        Ok(inner) => inner,
        Err(_) => Err(WorkerError::timeout(stage, limit.as_secs())),
    }
}

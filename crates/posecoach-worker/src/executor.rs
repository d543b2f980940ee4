//! Worker loop.
//!
//! One job at a time: claim, process under the job deadline, write the
//! terminal state, repeat. Shutdown is honoured between jobs.

use posecoach_models::{ComparisonJob, TerminalUpdate};
use posecoach_queue::{JobQueue, QueueError};
use tokio::sync::watch;
use tracing::{error, info, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::process_job;
use crate::retry::{retry_when, Backoff, Exhausted, PollFailures};
use crate::services::PipelineServices;

/// Consecutive poll failures logged before suppression.
const MAX_LOGGED_POLL_FAILURES: u32 = 5;

/// Single-consumer loop over the job queue.
pub struct WorkerLoop {
    config: WorkerConfig,
    queue: JobQueue,
    services: PipelineServices,
    terminal_retry: Backoff,
    shutdown: watch::Sender<bool>,
}

impl WorkerLoop {
    pub fn new(config: WorkerConfig, queue: JobQueue, services: PipelineServices) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            services,
            terminal_retry: Backoff::default(),
            shutdown,
        }
    }

    /// Backoff used for the terminal status write.
    pub fn with_terminal_retry(mut self, retry: Backoff) -> Self {
        self.terminal_retry = retry;
        self
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker_id = %self.queue.worker_id(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Starting worker loop"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut poll_failures = PollFailures::new(MAX_LOGGED_POLL_FAILURES);

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping worker loop");
                break;
            }

            let processed = match self.run_once().await {
                Ok(processed) => {
                    poll_failures.succeeded();
                    processed
                }
                Err(e) => {
                    poll_failures.failed(&e);
                    false
                }
            };
            if processed {
                continue;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Worker loop stopped");
        Ok(())
    }

    /// Claim and process at most one job. Returns whether a job was handled.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        let Some(job) = self.queue.claim_next().await? else {
            return Ok(false);
        };
        metrics::record_claimed();
        self.execute(&job).await;
        Ok(true)
    }

    /// Process a claimed job and persist its terminal state.
    pub async fn execute(&self, job: &ComparisonJob) -> TerminalUpdate {
        let logger = JobLogger::new(job);

        let run = process_job(&self.services, &self.config, job).instrument(logger.span());
        let result = match tokio::time::timeout(self.config.job_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::timeout("job", self.config.job_timeout.as_secs())),
        };

        let update = match result {
            Ok(processed) => {
                metrics::record_completed(logger.elapsed());
                TerminalUpdate::Done(processed.artifacts.into_job_outcome())
            }
            Err(e) => {
                logger.failed(&e);
                metrics::record_failed(e.kind(), logger.elapsed());
                TerminalUpdate::Error {
                    message: e.job_message(),
                }
            }
        };

        let write = retry_when(
            &self.terminal_retry,
            "terminal write",
            |e: &QueueError| e.is_retryable(),
            || self.queue.finish(job, &update),
        )
        .await;
        match write {
            Ok(()) => {
                info!(job_id = %job.id, status = %update.status(), "Terminal state written");
            }
            Err(Exhausted { error, attempts }) => {
                // still claimed by this worker, so the next poll picks it up again
                error!(
                    job_id = %job.id,
                    attempts,
                    "Failed to write terminal state, job stays pending: {}",
                    error
                );
            }
        }

        update
    }

    /// Signal shutdown. A job in flight finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

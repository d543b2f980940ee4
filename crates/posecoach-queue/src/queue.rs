//! Lease-based job queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use posecoach_firestore::StoredJob;
use posecoach_models::{ComparisonJob, JobOutcome, TerminalUpdate};
use tracing::{debug, info, warn};

use crate::error::QueueResult;
use crate::store::JobStore;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Firestore collection holding job records
    pub collection: String,
    /// Pending records fetched per poll
    pub candidate_limit: u32,
    /// Age after which a claim is considered abandoned
    pub claim_lease: Duration,
    /// Claim with an update-time precondition
    pub atomic_claim: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            collection: "comparison_jobs".to_string(),
            candidate_limit: 10,
            claim_lease: Duration::from_secs(3600 + 60),
            atomic_claim: true,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// Without `QUEUE_CLAIM_LEASE_SECS` the lease is the worker job
    /// timeout (`WORKER_JOB_TIMEOUT`) plus one minute.
    pub fn from_env() -> Self {
        let job_timeout_secs: u64 = std::env::var("WORKER_JOB_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        Self {
            collection: std::env::var("QUEUE_COLLECTION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "comparison_jobs".to_string()),
            candidate_limit: std::env::var("QUEUE_CANDIDATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
            claim_lease: Duration::from_secs(
                std::env::var("QUEUE_CLAIM_LEASE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(job_timeout_secs + 60),
            ),
            atomic_claim: std::env::var("QUEUE_ATOMIC_CLAIM")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(true),
        }
    }
}

/// Queue of comparison jobs for a single consumer.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    worker_id: String,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            config,
            worker_id: worker_id.into(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim one pending job, if any.
    ///
    /// Pending records are read a page at a time until a claimable one is
    /// found. Candidates with another worker's live claim are skipped; a job
    /// this worker already claimed is taken again. A lost conditional claim
    /// moves on to the next candidate.
    pub async fn claim_next(&self) -> QueueResult<Option<ComparisonJob>> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.config.claim_lease)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let page_size = self.config.candidate_limit.max(1);

        let mut offset = 0u32;
        loop {
            let page = self.store.find_pending(page_size, offset).await?;
            let fetched = page.len() as u32;

            if let Some(job) = self.claim_from(page, now, lease).await? {
                return Ok(Some(job));
            }
            if fetched < page_size {
                if offset + fetched > 0 {
                    debug!(candidates = offset + fetched, "No claimable job among pending candidates");
                }
                return Ok(None);
            }
            offset += fetched;
        }
    }

    async fn claim_from(
        &self,
        candidates: Vec<StoredJob>,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> QueueResult<Option<ComparisonJob>> {
        for candidate in candidates {
            if !candidate.job.is_claimable_by(&self.worker_id, now, lease) {
                debug!(job_id = %candidate.job.id, "Skipping job with a live claim");
                continue;
            }

            match candidate.job.claimed_by.as_deref() {
                Some(previous) if previous == self.worker_id => {
                    info!(job_id = %candidate.job.id, "Resuming job left pending by this worker");
                }
                Some(previous) => {
                    warn!(
                        job_id = %candidate.job.id,
                        previous_worker = previous,
                        "Reclaiming job whose lease expired"
                    );
                }
                None => {}
            }

            let claimed = if self.config.atomic_claim {
                match self.store.claim(&candidate, &self.worker_id, now).await? {
                    Some(claimed) => claimed,
                    None => {
                        debug!(job_id = %candidate.job.id, "Lost claim race");
                        continue;
                    }
                }
            } else {
                self.store
                    .claim_unconditionally(&candidate, &self.worker_id, now)
                    .await?
            };

            info!(job_id = %claimed.job.id, worker_id = %self.worker_id, "Claimed job");
            return Ok(Some(claimed.job));
        }
        Ok(None)
    }

    /// Write a terminal state for a claimed job.
    pub async fn finish(&self, job: &ComparisonJob, update: &TerminalUpdate) -> QueueResult<()> {
        let at = Utc::now();
        // reject illegal transitions before touching the store
        job.clone().apply(update, at)?;
        self.store.finish(&job.id, update, at).await
    }

    pub async fn complete(&self, job: &ComparisonJob, outcome: JobOutcome) -> QueueResult<()> {
        self.finish(job, &TerminalUpdate::Done(outcome)).await
    }

    pub async fn fail(&self, job: &ComparisonJob, message: impl Into<String>) -> QueueResult<()> {
        self.finish(
            job,
            &TerminalUpdate::Error {
                message: message.into(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::memory::MemoryJobStore;
    use posecoach_models::{JobId, JobStatus};
    use serial_test::serial;

    fn pending(id: &str) -> ComparisonJob {
        ComparisonJob::new("Ana", "user-1", "ref.mp4", "exec.mp4").with_id(JobId::from_string(id))
    }

    fn queue(store: Arc<MemoryJobStore>, config: QueueConfig) -> JobQueue {
        JobQueue::new(store, config, "worker-a")
    }

    #[tokio::test]
    async fn test_claim_next_stamps_claim() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert(pending("job-1"));

        let job = queue(store.clone(), QueueConfig::default())
            .claim_next()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(job.id.as_str(), "job-1");
        assert_eq!(job.status, JobStatus::Pending);
        let persisted = store.get(&job.id).unwrap();
        assert_eq!(persisted.claimed_by.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn test_live_claim_is_not_reclaimed() {
        let store = Arc::new(MemoryJobStore::new());
        store.insert(pending("job-1"));
        let other = JobQueue::new(store.clone(), QueueConfig::default(), "worker-b");

        assert!(other.claim_next().await.unwrap().is_some());
        assert!(queue(store, QueueConfig::default()).claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_own_claim_is_resumed_on_next_poll() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = pending("job-1");
        job.claim("worker-a", Utc::now() - chrono::Duration::seconds(5));
        store.insert(job);

        let claimed = queue(store.clone(), QueueConfig::default())
            .claim_next()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(claimed.id.as_str(), "job-1");
        assert_eq!(claimed.claimed_by.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn test_claim_pages_past_jobs_held_by_others() {
        let store = Arc::new(MemoryJobStore::new());
        for i in 0..10 {
            let mut job = pending(&format!("a-{:02}", i));
            job.claim("crashed", Utc::now());
            store.insert(job);
        }
        store.insert(pending("z-free"));

        let config = QueueConfig {
            candidate_limit: 4,
            ..QueueConfig::default()
        };
        let claimed = queue(store, config).claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id.as_str(), "z-free");
    }

    #[tokio::test]
    async fn test_exact_page_of_held_jobs_yields_none() {
        let store = Arc::new(MemoryJobStore::new());
        for i in 0..4 {
            let mut job = pending(&format!("a-{:02}", i));
            job.claim("crashed", Utc::now());
            store.insert(job);
        }

        let config = QueueConfig {
            candidate_limit: 2,
            ..QueueConfig::default()
        };
        assert!(queue(store, config).claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_claim_is_reclaimed() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = pending("job-1");
        job.claim("crashed-worker", Utc::now() - chrono::Duration::seconds(120));
        store.insert(job);

        let config = QueueConfig {
            claim_lease: Duration::from_secs(60),
            ..QueueConfig::default()
        };
        let claimed = queue(store, config).claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.claimed_by.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn test_stale_conditional_claim_loses() {
        let store = MemoryJobStore::new();
        store.insert(pending("job-1"));
        let stale: StoredJob = store.find_pending(10, 0).await.unwrap().remove(0);

        // another consumer wins first
        assert!(store.claim(&stale, "worker-b", Utc::now()).await.unwrap().is_some());
        assert!(store.claim(&stale, "worker-a", Utc::now()).await.unwrap().is_none());
        assert_eq!(
            store.get(&JobId::from_string("job-1")).unwrap().claimed_by.as_deref(),
            Some("worker-b")
        );
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_not_candidates() {
        let store = Arc::new(MemoryJobStore::new());
        let job = pending("job-1");
        store.insert(job.clone());
        let q = queue(store.clone(), QueueConfig::default());

        q.fail(&job, "boom").await.unwrap();
        assert!(q.claim_next().await.unwrap().is_none());
        assert_eq!(store.get(&job.id).unwrap().error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_finish_rejects_terminal_job() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = pending("job-1");
        store.insert(job.clone());
        let q = queue(store.clone(), QueueConfig::default());

        q.fail(&job, "boom").await.unwrap();
        job.status = JobStatus::Error;
        let err = q
            .complete(
                &job,
                JobOutcome {
                    video_url: None,
                    report_url: "r".into(),
                    feedback: "f".into(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Transition(_)));
        assert_eq!(store.terminal_writes().len(), 1);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("WORKER_JOB_TIMEOUT", "100");
        std::env::remove_var("QUEUE_CLAIM_LEASE_SECS");
        std::env::set_var("QUEUE_ATOMIC_CLAIM", "false");

        let config = QueueConfig::from_env();
        assert_eq!(config.claim_lease, Duration::from_secs(160));
        assert!(!config.atomic_claim);
        assert_eq!(config.collection, "comparison_jobs");

        std::env::remove_var("WORKER_JOB_TIMEOUT");
        std::env::remove_var("QUEUE_ATOMIC_CLAIM");
    }
}

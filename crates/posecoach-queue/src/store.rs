//! Job persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use posecoach_firestore::{JobRepository, StoredJob};
use posecoach_models::{JobId, TerminalUpdate};

use crate::error::QueueResult;

/// Persistence operations the queue needs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Up to `limit` records with status `pending`, skipping the first
    /// `offset` in a stable order.
    async fn find_pending(&self, limit: u32, offset: u32) -> QueueResult<Vec<StoredJob>>;

    /// Conditional claim; `None` when the record changed since it was read.
    async fn claim(&self, stored: &StoredJob, worker_id: &str, at: DateTime<Utc>) -> QueueResult<Option<StoredJob>>;

    /// Claim without a version check.
    async fn claim_unconditionally(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> QueueResult<StoredJob>;

    /// Single-update terminal write.
    async fn finish(&self, job_id: &JobId, update: &TerminalUpdate, at: DateTime<Utc>) -> QueueResult<()>;
}

#[async_trait]
impl JobStore for JobRepository {
    async fn find_pending(&self, limit: u32, offset: u32) -> QueueResult<Vec<StoredJob>> {
        Ok(JobRepository::find_pending(self, limit, offset).await?)
    }

    async fn claim(&self, stored: &StoredJob, worker_id: &str, at: DateTime<Utc>) -> QueueResult<Option<StoredJob>> {
        Ok(JobRepository::claim(self, stored, worker_id, at).await?)
    }

    async fn claim_unconditionally(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> QueueResult<StoredJob> {
        Ok(JobRepository::claim_unconditionally(self, stored, worker_id, at).await?)
    }

    async fn finish(&self, job_id: &JobId, update: &TerminalUpdate, at: DateTime<Utc>) -> QueueResult<()> {
        Ok(JobRepository::finish(self, job_id, update, at).await?)
    }
}

//! In-memory job store.
//!
//! Mirrors the Firestore semantics the queue relies on: a per-record
//! version that every write bumps, conditional claims against it, and
//! terminal transitions validated by the job state machine.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use posecoach_firestore::StoredJob;
use posecoach_models::{ComparisonJob, JobId, JobStatus, TerminalUpdate};

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

#[derive(Debug, Clone)]
struct Record {
    job: ComparisonJob,
    version: u64,
}

impl Record {
    fn stored(&self) -> StoredJob {
        StoredJob {
            job: self.job.clone(),
            update_time: Some(self.version.to_string()),
        }
    }
}

/// Job store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: Mutex<BTreeMap<String, Record>>,
    terminal_writes: Mutex<Vec<(JobId, JobStatus)>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a job.
    pub fn insert(&self, job: ComparisonJob) {
        let mut records = self.records();
        let version = records.get(job.id.as_str()).map_or(1, |r| r.version + 1);
        records.insert(job.id.as_str().to_string(), Record { job, version });
    }

    pub fn get(&self, job_id: &JobId) -> Option<ComparisonJob> {
        self.records().get(job_id.as_str()).map(|r| r.job.clone())
    }

    /// Terminal writes in the order they were applied.
    pub fn terminal_writes(&self) -> Vec<(JobId, JobStatus)> {
        self.terminal_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_pending(&self, limit: u32, offset: u32) -> QueueResult<Vec<StoredJob>> {
        Ok(self
            .records()
            .values()
            .filter(|r| r.job.status == JobStatus::Pending)
            .skip(offset as usize)
            .take(limit as usize)
            .map(Record::stored)
            .collect())
    }

    async fn claim(&self, stored: &StoredJob, worker_id: &str, at: DateTime<Utc>) -> QueueResult<Option<StoredJob>> {
        let mut records = self.records();
        let record = records
            .get_mut(stored.job.id.as_str())
            .ok_or_else(|| QueueError::unknown_job(stored.job.id.as_str()))?;

        if stored.update_time.as_deref() != Some(record.version.to_string().as_str()) {
            return Ok(None);
        }
        record.job.claim(worker_id, at);
        record.version += 1;
        Ok(Some(record.stored()))
    }

    async fn claim_unconditionally(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> QueueResult<StoredJob> {
        let mut records = self.records();
        let record = records
            .get_mut(stored.job.id.as_str())
            .ok_or_else(|| QueueError::unknown_job(stored.job.id.as_str()))?;

        record.job.claim(worker_id, at);
        record.version += 1;
        Ok(record.stored())
    }

    async fn finish(&self, job_id: &JobId, update: &TerminalUpdate, at: DateTime<Utc>) -> QueueResult<()> {
        {
            let mut records = self.records();
            let record = records
                .get_mut(job_id.as_str())
                .ok_or_else(|| QueueError::unknown_job(job_id.as_str()))?;
            record.job.apply(update, at)?;
            record.version += 1;
        }
        self.terminal_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id.clone(), update.status()));
        Ok(())
    }
}

//! Comparison job documents.
//!
//! Jobs live in a single root collection, one document per job, keyed by
//! the job ID. Field names match the serialized [`ComparisonJob`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use posecoach_models::{ComparisonJob, JobId, JobOutcome, JobStatus, TerminalUpdate};
use tracing::{debug, info};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics;
use crate::types::{Document, Precondition, StructuredQuery, ToFirestoreValue, Value};

pub const DEFAULT_COLLECTION: &str = "comparison_jobs";

const DONE_MASK: &[&str] = &["status", "video_url", "report_url", "feedback", "processed_at"];
const ERROR_MASK: &[&str] = &["status", "error_message", "processed_at"];
const CLAIM_MASK: &[&str] = &["claimed_by", "claimed_at"];

/// A job together with the document version it was read at.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job: ComparisonJob,
    /// Document `updateTime`, used as a claim precondition.
    pub update_time: Option<String>,
}

/// Repository for comparison job documents.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
    collection: String,
}

impl JobRepository {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create a new job document.
    pub async fn create(&self, job: &ComparisonJob) -> FirestoreResult<StoredJob> {
        let doc = self
            .client
            .create_document(&self.collection, job.id.as_str(), job_to_fields(job))
            .await?;
        info!(job_id = %job.id, "Created comparison job");
        Ok(StoredJob {
            job: job.clone(),
            update_time: doc.update_time,
        })
    }

    /// Get a job by ID.
    pub async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<StoredJob>> {
        let doc = self
            .client
            .with_retry("get_job", || self.client.get_document(&self.collection, job_id.as_str()))
            .await?;
        doc.map(|d| stored_job_from_document(&d)).transpose()
    }

    /// One page of jobs whose status is `pending`.
    ///
    /// Pages follow document name order, so `offset` walks past jobs that
    /// are still pending but held by another worker.
    pub async fn find_pending(&self, limit: u32, offset: u32) -> FirestoreResult<Vec<StoredJob>> {
        let query = StructuredQuery::collection(self.collection.clone())
            .where_eq("status", JobStatus::Pending.as_str().to_firestore_value())
            .offset(offset.min(i32::MAX as u32) as i32)
            .limit(limit.min(i32::MAX as u32) as i32);

        let docs = self
            .client
            .with_retry("find_pending_jobs", || self.client.run_query(query.clone()))
            .await?;
        debug!(count = docs.len(), offset, "Fetched pending jobs");

        docs.iter().map(stored_job_from_document).collect()
    }

    /// Stamp claim fields only if the document is unchanged since it was read.
    ///
    /// Returns `Ok(None)` when another consumer modified the job first.
    pub async fn claim(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> FirestoreResult<Option<StoredJob>> {
        let update_time = stored.update_time.clone().ok_or_else(|| {
            FirestoreError::malformed(format!("job {} has no updateTime", stored.job.id))
        })?;

        let result = self
            .client
            .update_document_with_precondition(
                &self.collection,
                stored.job.id.as_str(),
                claim_fields(worker_id, at),
                Some(CLAIM_MASK),
                &Precondition::UpdateTime(update_time),
            )
            .await;

        match result {
            Ok(doc) => Ok(Some(claimed(stored, worker_id, at, doc.update_time))),
            Err(e) if e.is_stale_write() => {
                debug!(job_id = %stored.job.id, "Claim lost to a concurrent update");
                metrics::record_claim_conflict();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stamp claim fields without a version check.
    pub async fn claim_unconditionally(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> FirestoreResult<StoredJob> {
        let doc = self
            .client
            .update_document(
                &self.collection,
                stored.job.id.as_str(),
                claim_fields(worker_id, at),
                Some(CLAIM_MASK),
            )
            .await?;
        Ok(claimed(stored, worker_id, at, doc.update_time))
    }

    /// Write a terminal status in one document update.
    ///
    /// Single attempt; the worker owns the retry policy for terminal writes.
    pub async fn finish(&self, job_id: &JobId, update: &TerminalUpdate, at: DateTime<Utc>) -> FirestoreResult<()> {
        let (fields, mask) = terminal_fields(update, at);
        self.client
            .update_document_with_precondition(
                &self.collection,
                job_id.as_str(),
                fields,
                Some(mask),
                &Precondition::Exists(true),
            )
            .await?;
        info!(job_id = %job_id, status = %update.status(), "Job finished");
        Ok(())
    }

    pub async fn mark_done(&self, job_id: &JobId, outcome: &JobOutcome, at: DateTime<Utc>) -> FirestoreResult<()> {
        self.finish(job_id, &TerminalUpdate::Done(outcome.clone()), at).await
    }

    pub async fn mark_error(&self, job_id: &JobId, message: &str, at: DateTime<Utc>) -> FirestoreResult<()> {
        self.finish(
            job_id,
            &TerminalUpdate::Error {
                message: message.to_string(),
            },
            at,
        )
        .await
    }
}

fn claimed(stored: &StoredJob, worker_id: &str, at: DateTime<Utc>, update_time: Option<String>) -> StoredJob {
    let mut job = stored.job.clone();
    job.claim(worker_id, at);
    StoredJob { job, update_time }
}

fn claim_fields(worker_id: &str, at: DateTime<Utc>) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("claimed_by".to_string(), worker_id.to_firestore_value());
    fields.insert("claimed_at".to_string(), at.to_firestore_value());
    fields
}

/// Fields and update mask for a terminal write.
///
/// A done job without a video keeps `video_url` in the mask, so any
/// stale value is removed.
pub fn terminal_fields(update: &TerminalUpdate, at: DateTime<Utc>) -> (HashMap<String, Value>, &'static [&'static str]) {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), update.status().as_str().to_firestore_value());
    fields.insert("processed_at".to_string(), at.to_firestore_value());

    match update {
        TerminalUpdate::Done(outcome) => {
            if let Some(url) = &outcome.video_url {
                fields.insert("video_url".to_string(), url.to_firestore_value());
            }
            fields.insert("report_url".to_string(), outcome.report_url.to_firestore_value());
            fields.insert("feedback".to_string(), outcome.feedback.to_firestore_value());
            (fields, DONE_MASK)
        }
        TerminalUpdate::Error { message } => {
            fields.insert("error_message".to_string(), message.to_firestore_value());
            (fields, ERROR_MASK)
        }
    }
}

/// Convert a job to document fields.
pub fn job_to_fields(job: &ComparisonJob) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("student".to_string(), job.student.to_firestore_value());
    fields.insert("user".to_string(), job.user.to_firestore_value());
    fields.insert("ref_path".to_string(), job.ref_path.to_firestore_value());
    fields.insert("exec_path".to_string(), job.exec_path.to_firestore_value());
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());

    let optional = [
        ("video_url", job.video_url.as_ref().map(|v| v.to_firestore_value())),
        ("report_url", job.report_url.as_ref().map(|v| v.to_firestore_value())),
        ("feedback", job.feedback.as_ref().map(|v| v.to_firestore_value())),
        ("error_message", job.error_message.as_ref().map(|v| v.to_firestore_value())),
        ("processed_at", job.processed_at.map(|v| v.to_firestore_value())),
        ("created_at", job.created_at.map(|v| v.to_firestore_value())),
        ("claimed_by", job.claimed_by.as_ref().map(|v| v.to_firestore_value())),
        ("claimed_at", job.claimed_at.map(|v| v.to_firestore_value())),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            fields.insert(name.to_string(), value);
        }
    }
    fields
}

/// Parse a job document.
///
/// Missing text fields become empty strings so that a malformed job can
/// still be claimed and failed with a validation error.
pub fn job_from_document(doc: &Document) -> FirestoreResult<ComparisonJob> {
    let id = doc
        .id()
        .ok_or_else(|| FirestoreError::malformed("job document without a name"))?;

    let status = match doc.get::<String>("status") {
        Some(s) => s
            .parse::<JobStatus>()
            .map_err(|e| FirestoreError::malformed(format!("job {}: {}", id, e)))?,
        None => JobStatus::Pending,
    };

    Ok(ComparisonJob {
        id: JobId::from_string(id),
        student: doc.get("student").unwrap_or_default(),
        user: doc.get("user").unwrap_or_default(),
        ref_path: doc.get("ref_path").unwrap_or_default(),
        exec_path: doc.get("exec_path").unwrap_or_default(),
        status,
        video_url: doc.get("video_url"),
        report_url: doc.get("report_url"),
        feedback: doc.get("feedback"),
        error_message: doc.get("error_message"),
        processed_at: doc.get("processed_at"),
        created_at: doc.get("created_at"),
        claimed_by: doc.get("claimed_by"),
        claimed_at: doc.get("claimed_at"),
    })
}

fn stored_job_from_document(doc: &Document) -> FirestoreResult<StoredJob> {
    Ok(StoredJob {
        job: job_from_document(doc)?,
        update_time: doc.update_time.clone(),
    })
}

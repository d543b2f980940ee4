//! Firestore request metrics.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::{FirestoreError, FirestoreResult};

pub const REQUESTS_TOTAL: &str = "posecoach_firestore_requests_total";
pub const REQUEST_SECONDS: &str = "posecoach_firestore_request_seconds";
pub const RETRIES_TOTAL: &str = "posecoach_firestore_retries_total";
/// Claims that lost the `updateTime` race to another writer.
pub const CLAIM_CONFLICTS_TOTAL: &str = "posecoach_firestore_claim_conflicts_total";

/// Outcome label for a finished request.
pub fn outcome<T>(result: &FirestoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_stale_write() => "conflict",
        Err(FirestoreError::Missing(_)) => "not_found",
        Err(e) if e.is_retryable() => "unavailable",
        Err(_) => "failed",
    }
}

pub fn record_request(operation: &str, outcome: &'static str, elapsed: Duration) {
    counter!(REQUESTS_TOTAL, "operation" => operation.to_string(), "outcome" => outcome).increment(1);
    histogram!(REQUEST_SECONDS, "operation" => operation.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_retry(operation: &str) {
    counter!(RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_claim_conflict() {
    counter!(CLAIM_CONFLICTS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(&Ok::<_, FirestoreError>(())), "ok");
        assert_eq!(outcome::<()>(&Err(FirestoreError::from_http_status(412, "stale"))), "conflict");
        assert_eq!(outcome::<()>(&Err(FirestoreError::missing("jobs/x"))), "not_found");
        assert_eq!(outcome::<()>(&Err(FirestoreError::from_http_status(503, "down"))), "unavailable");
        assert_eq!(outcome::<()>(&Err(FirestoreError::from_http_status(400, "bad"))), "failed");
    }
}

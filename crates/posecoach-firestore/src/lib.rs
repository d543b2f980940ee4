//! Firestore REST API client.
//!
//! This crate provides:
//! - A typed repository for comparison job documents
//! - Structured queries and precondition-guarded updates
//! - Service account authentication via gcp_auth (or the emulator)
//! - Retry with backoff and request metrics

pub mod client;
pub mod error;
pub mod job_repo;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::{JobRepository, StoredJob, DEFAULT_COLLECTION};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, Precondition, StructuredQuery, ToFirestoreValue, Value};

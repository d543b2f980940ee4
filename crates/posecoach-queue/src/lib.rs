//! Durable comparison job queue.
//!
//! This crate provides:
//! - The [`JobStore`] seam over job persistence (Firestore in production)
//! - Lease-based claiming of pending jobs with an update-time precondition
//! - Terminal status writes (`done` / `error`)
//! - An in-memory store for tests and local runs

pub mod error;
pub mod memory;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobStore;
pub use queue::{JobQueue, QueueConfig};
pub use store::JobStore;
pub use posecoach_firestore::StoredJob;

//! Shared data models for the PoseCoach backend.
//!
//! This crate provides Serde-serializable types for:
//! - Body joints and their skeleton topology
//! - Landmark frames and pose sequences
//! - Comparison results and report payloads
//! - Comparison jobs and their lifecycle
//! - Storage locator helpers

pub mod comparison;
pub mod job;
pub mod joint;
pub mod landmark;
pub mod utils;

// Re-export common types
pub use comparison::{ComparisonReport, ComparisonResult, JointError, MetricKind, RankedJoint, VideoLink};
pub use job::{ComparisonJob, JobId, JobOutcome, JobStatus, TerminalUpdate, TransitionError};
pub use joint::{Joint, POSE_CONNECTIONS};
pub use landmark::{Landmark, LandmarkFrame, PoseSequence};
pub use utils::{extract_key_from_locator, storage_slug, LocatorError, LocatorResult};

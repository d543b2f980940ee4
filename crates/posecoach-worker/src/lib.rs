//! Comparison job worker.
//!
//! This crate provides:
//! - The single-consumer worker loop with terminal status writes
//! - The comparison pipeline (inputs, landmarks, alignment, scoring)
//! - Artifact generation: comparison video, Gemini feedback, PDF report
//! - Collaborator traits with production adapters
//! - Graceful shutdown between jobs

pub mod adapters;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod services;
pub mod stage;

pub use adapters::production_services;
pub use artifacts::{ArtifactCoordinator, ArtifactOutcome, ArtifactRequest};
pub use config::WorkerConfig;
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use executor::WorkerLoop;
pub use feedback::GeminiFeedback;
pub use logging::JobLogger;
pub use pipeline::{process_job, ProcessedJob};
pub use services::{
    ExtractedPose, FeedbackGenerator, FrameRenderer, ObjectStore, PipelineServices, PoseExtractor, ReportRenderer,
    VideoEncoder,
};

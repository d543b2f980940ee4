//! Sequence alignment and pose comparison.
//!
//! Pure, synchronous building blocks used by the worker:
//! - [`align`] pairs frame indices of two sequences of different length
//! - [`ComparisonEngine`] scores two landmark sequences along a plan and
//!   ranks the joints that deviate most

pub mod aligner;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod insights;

pub use aligner::{align, AlignmentPlan, AlignmentStep};
pub use engine::{compare, ComparisonConfig, ComparisonEngine};
pub use error::{AnalysisError, AnalysisResult, SequenceSide};

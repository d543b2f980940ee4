//! Error types for alignment and comparison.

use std::fmt;
use thiserror::Error;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Which of the two compared sequences an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceSide {
    Reference,
    Execution,
}

impl fmt::Display for SequenceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceSide::Reference => write!(f, "reference"),
            SequenceSide::Execution => write!(f, "execution"),
        }
    }
}

/// Errors that can occur while aligning or comparing sequences.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("The {0} landmark sequence is empty")]
    EmptySequence(SequenceSide),

    #[error("No comparable landmark data between reference and execution")]
    NoComparableData,

    #[error(
        "Alignment step {step} references ({reference_index}, {execution_index}) \
         outside sequences of length ({reference_len}, {execution_len})"
    )]
    PlanOutOfBounds {
        step: usize,
        reference_index: usize,
        execution_index: usize,
        reference_len: usize,
        execution_len: usize,
    },
}

impl AnalysisError {
    /// Create an empty-sequence error.
    pub fn empty(side: SequenceSide) -> Self {
        Self::EmptySequence(side)
    }
}

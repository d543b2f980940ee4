//! Frame-index alignment between two sequences.
//!
//! Sequences of different length are paired step by step. The shorter side
//! holds its last frame once it runs out (tail clamping), so the plan keeps
//! temporal correspondence at the start and never loops back.

use serde::Serialize;

use crate::error::{AnalysisError, AnalysisResult, SequenceSide};

/// One unit of correspondence between a reference and an execution frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlignmentStep {
    pub reference_index: usize,
    pub execution_index: usize,
}

/// Ordered index pairs, one per output step.
///
/// Only [`align`] builds plans, so every index is in bounds for the lengths
/// it was built from and both index columns are non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignmentPlan {
    steps: Vec<AlignmentStep>,
    reference_len: usize,
    execution_len: usize,
}

impl AlignmentPlan {
    pub fn steps(&self) -> &[AlignmentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<AlignmentStep> {
        self.steps.get(step).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignmentStep> {
        self.steps.iter()
    }

    /// Length of the reference sequence the plan was built for.
    pub fn reference_len(&self) -> usize {
        self.reference_len
    }

    /// Length of the execution sequence the plan was built for.
    pub fn execution_len(&self) -> usize {
        self.execution_len
    }

    /// Steps where one side is held on its last frame.
    pub fn padded_steps(&self) -> usize {
        self.steps
            .iter()
            .enumerate()
            .filter(|(i, s)| s.reference_index != *i || s.execution_index != *i)
            .count()
    }

    /// Share of padded steps in the plan, in [0, 1].
    pub fn padded_ratio(&self) -> f64 {
        if self.steps.is_empty() {
            0.0
        } else {
            self.padded_steps() as f64 / self.steps.len() as f64
        }
    }
}

/// Pair the frames of a reference sequence of length `reference_len` with an
/// execution sequence of length `execution_len`.
///
/// The plan has `max(reference_len, execution_len)` steps; step `i` pairs
/// `min(i, reference_len - 1)` with `min(i, execution_len - 1)`.
pub fn align(reference_len: usize, execution_len: usize) -> AnalysisResult<AlignmentPlan> {
    if reference_len == 0 {
        return Err(AnalysisError::empty(SequenceSide::Reference));
    }
    if execution_len == 0 {
        return Err(AnalysisError::empty(SequenceSide::Execution));
    }

    let steps = (0..reference_len.max(execution_len))
        .map(|i| AlignmentStep {
            reference_index: i.min(reference_len - 1),
            execution_index: i.min(execution_len - 1),
        })
        .collect();

    Ok(AlignmentPlan {
        steps,
        reference_len,
        execution_len,
    })
}

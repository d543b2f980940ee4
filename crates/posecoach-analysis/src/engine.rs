//! Pose comparison engine.
//!
//! Scores an execution sequence against a reference sequence over an
//! [`AlignmentPlan`]. Joints below the confidence threshold in either frame
//! count as missing data, never as zero error.

use std::collections::BTreeMap;

use posecoach_models::{ComparisonResult, JointError, LandmarkFrame, MetricKind, PoseSequence};
use tracing::debug;

use crate::aligner::AlignmentPlan;
use crate::error::{AnalysisError, AnalysisResult};
use crate::geometry::{distance, joint_angle};
use crate::insights::{insight_text, rank_joints};

/// Tunables for [`ComparisonEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonConfig {
    /// Minimum landmark visibility for a joint to be compared
    pub confidence_threshold: f64,
    /// Number of insights to produce
    pub max_insights: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_insights: 5,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Compares two landmark sequences joint by joint.
#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine {
    config: ComparisonConfig,
}

impl ComparisonEngine {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    /// Per-joint errors between two frames.
    ///
    /// Only joints present and confident in both frames produce an error.
    /// Angle joints also need both neighbouring joints confident in both.
    pub fn frame_errors(&self, reference: &LandmarkFrame, execution: &LandmarkFrame) -> Vec<JointError> {
        let threshold = self.config.confidence_threshold;

        reference
            .joints()
            .filter_map(|joint| {
                let r = reference.visible(joint, threshold)?;
                let e = execution.visible(joint, threshold)?;

                let kind = MetricKind::for_joint(joint);
                let value = match kind {
                    MetricKind::Angular => {
                        let ra = joint_angle(reference, joint, threshold)?;
                        let ea = joint_angle(execution, joint, threshold)?;
                        (ra - ea).abs()
                    }
                    MetricKind::Positional => distance(r.position(), e.position()),
                };

                value.is_finite().then_some(JointError { joint, value, kind })
            })
            .collect()
    }

    /// Score `execution` against `reference` along `plan`.
    pub fn compare(
        &self,
        reference: &PoseSequence,
        execution: &PoseSequence,
        plan: &AlignmentPlan,
    ) -> AnalysisResult<ComparisonResult> {
        let mut per_joint: BTreeMap<_, Accumulator> = BTreeMap::new();
        let mut overall = Accumulator::default();
        let mut step_average_error = Vec::with_capacity(plan.len());

        for (i, step) in plan.iter().enumerate() {
            let (Some(ref_frame), Some(exec_frame)) = (
                reference.get(step.reference_index),
                execution.get(step.execution_index),
            ) else {
                return Err(AnalysisError::PlanOutOfBounds {
                    step: i,
                    reference_index: step.reference_index,
                    execution_index: step.execution_index,
                    reference_len: reference.len(),
                    execution_len: execution.len(),
                });
            };

            let mut step_acc = Accumulator::default();
            for error in self.frame_errors(ref_frame, exec_frame) {
                per_joint.entry(error.joint).or_default().add(error.value);
                overall.add(error.value);
                step_acc.add(error.value);
            }
            step_average_error.push(step_acc.mean());
        }

        let overall_average_error = overall.mean().ok_or(AnalysisError::NoComparableData)?;

        let per_joint_average_error: BTreeMap<_, _> = per_joint
            .into_iter()
            .filter_map(|(joint, acc)| acc.mean().map(|avg| (joint, avg)))
            .collect();

        let ranked_joints = rank_joints(&per_joint_average_error, self.config.max_insights);
        let ranked_insights = ranked_joints.iter().map(insight_text).collect();

        debug!(
            steps = plan.len(),
            samples = overall.count,
            joints = per_joint_average_error.len(),
            overall_average_error,
            "Comparison complete"
        );

        Ok(ComparisonResult {
            overall_average_error,
            per_joint_average_error,
            ranked_insights,
            ranked_joints,
            sample_count: overall.count,
            step_average_error,
        })
    }
}

/// Compare with the default configuration.
pub fn compare(
    reference: &PoseSequence,
    execution: &PoseSequence,
    plan: &AlignmentPlan,
) -> AnalysisResult<ComparisonResult> {
    ComparisonEngine::default().compare(reference, execution, plan)
}

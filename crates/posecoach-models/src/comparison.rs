//! Comparison results and report payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::joint::Joint;

/// How a joint's error is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Absolute angle difference in degrees
    Angular,
    /// Euclidean distance in normalized coordinates
    Positional,
}

impl MetricKind {
    pub fn for_joint(joint: Joint) -> Self {
        if joint.is_angle_joint() {
            MetricKind::Angular
        } else {
            MetricKind::Positional
        }
    }

    /// Unit suffix used when formatting a value of this kind.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Angular => "°",
            MetricKind::Positional => " units",
        }
    }

    /// Format a value with its unit, two decimals.
    pub fn format(&self, value: f64) -> String {
        format!("{:.2}{}", value, self.unit())
    }
}

/// Error of one joint at one alignment step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointError {
    pub joint: Joint,
    pub value: f64,
    pub kind: MetricKind,
}

/// A joint and its average error, as ranked for insights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedJoint {
    pub joint: Joint,
    pub average_error: f64,
    pub kind: MetricKind,
}

/// Aggregate comparison of a reference and an execution sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Flat mean over every included (step, joint) sample
    pub overall_average_error: f64,
    /// Joints with no included sample are absent
    pub per_joint_average_error: BTreeMap<Joint, f64>,
    /// Highest error first
    pub ranked_insights: Vec<String>,
    /// Joints behind `ranked_insights`, same order
    pub ranked_joints: Vec<RankedJoint>,
    /// Number of included samples
    pub sample_count: usize,
    /// Mean error per alignment step; `None` where nothing was comparable
    pub step_average_error: Vec<Option<f64>>,
}

/// Video section of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VideoLink {
    Available { url: String },
    Unavailable,
}

impl VideoLink {
    pub fn url(&self) -> Option<&str> {
        match self {
            VideoLink::Available { url } => Some(url),
            VideoLink::Unavailable => None,
        }
    }
}

/// Everything the report renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub student: String,
    pub overall_average_error: f64,
    pub insights: Vec<String>,
    pub feedback: Option<String>,
    pub video: VideoLink,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_for_joint() {
        assert_eq!(MetricKind::for_joint(Joint::LeftElbow), MetricKind::Angular);
        assert_eq!(MetricKind::for_joint(Joint::LeftWrist), MetricKind::Positional);
    }

    #[test]
    fn test_format() {
        assert_eq!(MetricKind::Angular.format(12.345), "12.35°");
        assert_eq!(MetricKind::Positional.format(0.1), "0.10 units");
    }

    #[test]
    fn test_video_link_url() {
        let link = VideoLink::Available {
            url: "https://cdn/x.mp4".into(),
        };
        assert_eq!(link.url(), Some("https://cdn/x.mp4"));
        assert_eq!(VideoLink::Unavailable.url(), None);
    }
}

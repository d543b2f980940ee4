//! Ranking of joints into corrective insights.

use std::collections::BTreeMap;

use posecoach_models::{Joint, MetricKind, RankedJoint};

/// Rank joints by average error, highest first, keeping at most `limit`.
///
/// Ties keep joint order.
pub fn rank_joints(per_joint: &BTreeMap<Joint, f64>, limit: usize) -> Vec<RankedJoint> {
    let mut ranked: Vec<RankedJoint> = per_joint
        .iter()
        .map(|(joint, avg)| RankedJoint {
            joint: *joint,
            average_error: *avg,
            kind: MetricKind::for_joint(*joint),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.average_error
            .total_cmp(&a.average_error)
            .then_with(|| a.joint.cmp(&b.joint))
    });
    ranked.truncate(limit);
    ranked
}

/// Insight sentence for one ranked joint.
pub fn insight_text(ranked: &RankedJoint) -> String {
    format!(
        "{}: average deviation of {} from the reference",
        ranked.joint.label(),
        ranked.kind.format(ranked.average_error)
    )
}

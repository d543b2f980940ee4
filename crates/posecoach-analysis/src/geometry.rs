//! Vector helpers for joint angles and distances.

use posecoach_models::{Joint, LandmarkFrame};

const MIN_SEGMENT_LENGTH: f64 = 1e-9;

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Euclidean distance between two 3D points.
pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm(sub(a, b))
}

/// Angle in degrees at `vertex` between the segments to `a` and `b`.
///
/// Returns `None` when either segment is degenerate.
pub fn angle_at(a: [f64; 3], vertex: [f64; 3], b: [f64; 3]) -> Option<f64> {
    let u = sub(a, vertex);
    let v = sub(b, vertex);
    let (nu, nv) = (norm(u), norm(v));
    if nu < MIN_SEGMENT_LENGTH || nv < MIN_SEGMENT_LENGTH {
        return None;
    }
    let cos = (dot(u, v) / (nu * nv)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Body angle at `joint` in `frame`, if the joint carries one and all three
/// landmarks pass `threshold`.
pub fn joint_angle(frame: &LandmarkFrame, joint: Joint, threshold: f64) -> Option<f64> {
    let (a, b) = joint.angle_segments()?;
    let vertex = frame.visible(joint, threshold)?;
    let a = frame.visible(a, threshold)?;
    let b = frame.visible(b, threshold)?;
    angle_at(a.position(), vertex.position(), b.position())
}

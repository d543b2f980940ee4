//! Body joint topology.
//!
//! Joints follow the 33-point BlazePose layout used by the pose service, in
//! the same index order. Declaration order is also the sort order, so maps
//! keyed by [`Joint`] iterate head to feet.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named body landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

/// Skeleton edges drawn by the frame overlay.
pub const POSE_CONNECTIONS: &[(Joint, Joint)] = &[
    (Joint::Nose, Joint::LeftEyeInner),
    (Joint::LeftEyeInner, Joint::LeftEye),
    (Joint::LeftEye, Joint::LeftEyeOuter),
    (Joint::LeftEyeOuter, Joint::LeftEar),
    (Joint::Nose, Joint::RightEyeInner),
    (Joint::RightEyeInner, Joint::RightEye),
    (Joint::RightEye, Joint::RightEyeOuter),
    (Joint::RightEyeOuter, Joint::RightEar),
    (Joint::MouthLeft, Joint::MouthRight),
    (Joint::LeftShoulder, Joint::RightShoulder),
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::LeftWrist, Joint::LeftPinky),
    (Joint::LeftWrist, Joint::LeftIndex),
    (Joint::LeftWrist, Joint::LeftThumb),
    (Joint::LeftPinky, Joint::LeftIndex),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    (Joint::RightWrist, Joint::RightPinky),
    (Joint::RightWrist, Joint::RightIndex),
    (Joint::RightWrist, Joint::RightThumb),
    (Joint::RightPinky, Joint::RightIndex),
    (Joint::LeftShoulder, Joint::LeftHip),
    (Joint::RightShoulder, Joint::RightHip),
    (Joint::LeftHip, Joint::RightHip),
    (Joint::LeftHip, Joint::LeftKnee),
    (Joint::RightHip, Joint::RightKnee),
    (Joint::LeftKnee, Joint::LeftAnkle),
    (Joint::RightKnee, Joint::RightAnkle),
    (Joint::LeftAnkle, Joint::LeftHeel),
    (Joint::RightAnkle, Joint::RightHeel),
    (Joint::LeftHeel, Joint::LeftFootIndex),
    (Joint::RightHeel, Joint::RightFootIndex),
    (Joint::LeftAnkle, Joint::LeftFootIndex),
    (Joint::RightAnkle, Joint::RightFootIndex),
];

impl Joint {
    /// All joints in pose-service index order.
    pub const ALL: [Joint; 33] = [
        Joint::Nose,
        Joint::LeftEyeInner,
        Joint::LeftEye,
        Joint::LeftEyeOuter,
        Joint::RightEyeInner,
        Joint::RightEye,
        Joint::RightEyeOuter,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::MouthLeft,
        Joint::MouthRight,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftPinky,
        Joint::RightPinky,
        Joint::LeftIndex,
        Joint::RightIndex,
        Joint::LeftThumb,
        Joint::RightThumb,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
        Joint::LeftHeel,
        Joint::RightHeel,
        Joint::LeftFootIndex,
        Joint::RightFootIndex,
    ];

    /// Look up a joint by its pose-service landmark index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Pose-service landmark index.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Stable snake_case name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEyeInner => "left_eye_inner",
            Joint::LeftEye => "left_eye",
            Joint::LeftEyeOuter => "left_eye_outer",
            Joint::RightEyeInner => "right_eye_inner",
            Joint::RightEye => "right_eye",
            Joint::RightEyeOuter => "right_eye_outer",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::MouthLeft => "mouth_left",
            Joint::MouthRight => "mouth_right",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftPinky => "left_pinky",
            Joint::RightPinky => "right_pinky",
            Joint::LeftIndex => "left_index",
            Joint::RightIndex => "right_index",
            Joint::LeftThumb => "left_thumb",
            Joint::RightThumb => "right_thumb",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
            Joint::LeftHeel => "left_heel",
            Joint::RightHeel => "right_heel",
            Joint::LeftFootIndex => "left_foot_index",
            Joint::RightFootIndex => "right_foot_index",
        }
    }

    /// Human-readable label used in insights and reports.
    pub fn label(&self) -> String {
        let name = self.as_str().replace('_', " ");
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// The two neighbouring joints whose limb segments define the body angle
    /// at this joint, for joints that carry one.
    pub fn angle_segments(&self) -> Option<(Joint, Joint)> {
        match self {
            Joint::LeftElbow => Some((Joint::LeftShoulder, Joint::LeftWrist)),
            Joint::RightElbow => Some((Joint::RightShoulder, Joint::RightWrist)),
            Joint::LeftKnee => Some((Joint::LeftHip, Joint::LeftAnkle)),
            Joint::RightKnee => Some((Joint::RightHip, Joint::RightAnkle)),
            Joint::LeftHip => Some((Joint::LeftShoulder, Joint::LeftKnee)),
            Joint::RightHip => Some((Joint::RightShoulder, Joint::RightKnee)),
            Joint::LeftShoulder => Some((Joint::LeftElbow, Joint::LeftHip)),
            Joint::RightShoulder => Some((Joint::RightElbow, Joint::RightHip)),
            _ => None,
        }
    }

    /// Whether the error at this joint is measured as an angle.
    pub fn is_angle_joint(&self) -> bool {
        self.angle_segments().is_some()
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

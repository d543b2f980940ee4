//! Landmark frames and pose sequences.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::joint::Joint;

/// One detected keypoint in normalized video-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Detection confidence in [0, 1]
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility: visibility.clamp(0.0, 1.0),
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// True when the landmark's confidence reaches `threshold`.
    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }
}

/// All landmarks detected on one video frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Index of the source frame in the decoded video
    pub frame_index: u32,
    /// Landmarks keyed by joint
    pub landmarks: BTreeMap<Joint, Landmark>,
}

impl LandmarkFrame {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            landmarks: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with_landmark(mut self, joint: Joint, landmark: Landmark) -> Self {
        self.landmarks.insert(joint, landmark);
        self
    }

    pub fn get(&self, joint: Joint) -> Option<&Landmark> {
        self.landmarks.get(&joint)
    }

    /// Landmark at `joint` if it reaches the confidence threshold.
    pub fn visible(&self, joint: Joint, threshold: f64) -> Option<&Landmark> {
        self.landmarks.get(&joint).filter(|l| l.is_visible(threshold))
    }

    pub fn joints(&self) -> impl Iterator<Item = Joint> + '_ {
        self.landmarks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Time-ordered landmark frames for one video.
///
/// Frame `i` corresponds to decoded video frame `i` of the same extraction;
/// the sequence is not modified after extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseSequence {
    frames: Vec<LandmarkFrame>,
}

impl PoseSequence {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LandmarkFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[LandmarkFrame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LandmarkFrame> {
        self.frames.iter()
    }

    /// Source frame indices, in order.
    pub fn frame_indices(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.frame_index).collect()
    }
}

impl From<Vec<LandmarkFrame>> for PoseSequence {
    fn from(frames: Vec<LandmarkFrame>) -> Self {
        Self::new(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_clamped() {
        let lm = Landmark::new(0.1, 0.2, 0.0, 1.7);
        assert_eq!(lm.visibility, 1.0);
        assert!(lm.is_visible(0.5));
    }

    #[test]
    fn test_visible_filters_low_confidence() {
        let frame = LandmarkFrame::new(3)
            .with_landmark(Joint::Nose, Landmark::new(0.5, 0.5, 0.0, 0.9))
            .with_landmark(Joint::LeftKnee, Landmark::new(0.4, 0.8, 0.0, 0.2));

        assert!(frame.visible(Joint::Nose, 0.5).is_some());
        assert!(frame.visible(Joint::LeftKnee, 0.5).is_none());
        assert!(frame.visible(Joint::RightKnee, 0.5).is_none());
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_sequence_serializes_as_array() {
        let seq = PoseSequence::new(vec![LandmarkFrame::new(0), LandmarkFrame::new(2)]);
        let json = serde_json::to_value(&seq).unwrap();
        assert!(json.is_array());
        assert_eq!(seq.frame_indices(), vec![0, 2]);
    }
}

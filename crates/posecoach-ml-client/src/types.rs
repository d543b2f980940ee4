//! Pose service request/response types.

use posecoach_models::{Joint, Landmark, LandmarkFrame, PoseSequence};
use serde::{Deserialize, Serialize};

use crate::error::{MlError, MlResult};

/// Request for landmark extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRequest {
    /// Path to input video, readable by the service
    pub input_path: String,
    /// Upper bound on decoded frames
    pub max_frames: u32,
}

/// One landmark as sent by the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub visibility: f64,
}

/// Landmarks for one decoded frame, in BlazePose index order.
///
/// An empty list means no person was detected on that frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseFrame {
    pub frame_index: u32,
    #[serde(default)]
    pub landmarks: Vec<RawLandmark>,
}

/// Response from landmark extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseResponse {
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frames: Vec<PoseFrame>,
}

/// Extracted landmarks plus source video properties.
#[derive(Debug, Clone)]
pub struct PoseExtraction {
    /// Frames with a detection, ordered by source frame index
    pub sequence: PoseSequence,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl PoseResponse {
    /// Keep detected frames only, ordered and capped at `max_frames`.
    pub fn into_extraction(self, max_frames: u32) -> MlResult<PoseExtraction> {
        let mut frames = self.frames;
        frames.sort_by_key(|f| f.frame_index);
        frames.dedup_by_key(|f| f.frame_index);

        let mut out = Vec::with_capacity(frames.len());
        for frame in frames.into_iter().filter(|f| f.frame_index < max_frames) {
            if frame.landmarks.is_empty() {
                continue;
            }
            out.push(to_landmark_frame(frame)?);
        }

        Ok(PoseExtraction {
            sequence: PoseSequence::new(out),
            fps: self.fps.filter(|f| f.is_finite() && *f > 0.0),
            width: self.width,
            height: self.height,
        })
    }
}

fn to_landmark_frame(frame: PoseFrame) -> MlResult<LandmarkFrame> {
    if frame.landmarks.len() > Joint::ALL.len() {
        return Err(MlError::malformed(format!(
            "frame {} has {} landmarks, expected at most {}",
            frame.frame_index,
            frame.landmarks.len(),
            Joint::ALL.len()
        )));
    }

    let mut out = LandmarkFrame::new(frame.frame_index);
    for (joint, raw) in Joint::ALL.iter().zip(frame.landmarks) {
        if [raw.x, raw.y, raw.z, raw.visibility].iter().all(|v| v.is_finite()) {
            out.landmarks
                .insert(*joint, Landmark::new(raw.x, raw.y, raw.z, raw.visibility));
        }
    }
    Ok(out)
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(v: f64) -> RawLandmark {
        RawLandmark {
            x: v,
            y: v,
            z: 0.0,
            visibility: 0.9,
        }
    }

    #[test]
    fn test_undetected_frames_are_dropped() {
        let response = PoseResponse {
            fps: Some(25.0),
            width: Some(640),
            height: Some(360),
            frames: vec![
                PoseFrame {
                    frame_index: 2,
                    landmarks: vec![raw(0.2); 33],
                },
                PoseFrame {
                    frame_index: 0,
                    landmarks: vec![raw(0.1); 33],
                },
                PoseFrame {
                    frame_index: 1,
                    landmarks: vec![],
                },
            ],
        };

        let extraction = response.into_extraction(300).unwrap();
        assert_eq!(extraction.sequence.frame_indices(), vec![0, 2]);
        assert_eq!(extraction.sequence.get(0).unwrap().len(), 33);
        assert_eq!(extraction.fps, Some(25.0));
    }

    #[test]
    fn test_max_frames_cap() {
        let frames = (0..10)
            .map(|i| PoseFrame {
                frame_index: i,
                landmarks: vec![raw(0.5); 33],
            })
            .collect();
        let response = PoseResponse {
            fps: None,
            width: None,
            height: None,
            frames,
        };
        assert_eq!(response.into_extraction(4).unwrap().sequence.len(), 4);
    }

    #[test]
    fn test_too_many_landmarks() {
        let response = PoseResponse {
            fps: Some(0.0),
            width: None,
            height: None,
            frames: vec![PoseFrame {
                frame_index: 0,
                landmarks: vec![raw(0.5); 34],
            }],
        };
        assert!(matches!(
            response.into_extraction(300),
            Err(MlError::Malformed(_))
        ));
    }

    #[test]
    fn test_landmarks_map_to_joint_order() {
        let mut landmarks = vec![raw(0.0); 33];
        landmarks[Joint::LeftElbow.index()] = raw(0.75);
        let response = PoseResponse {
            fps: Some(0.0),
            width: None,
            height: None,
            frames: vec![PoseFrame {
                frame_index: 0,
                landmarks,
            }],
        };

        let extraction = response.into_extraction(300).unwrap();
        assert!(extraction.fps.is_none());
        let frame = extraction.sequence.get(0).unwrap();
        assert_eq!(frame.get(Joint::LeftElbow).unwrap().x, 0.75);
    }
}

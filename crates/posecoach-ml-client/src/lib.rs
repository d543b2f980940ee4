//! Client for the pose-estimation service.
//!
//! The service runs BlazePose over a local video file and returns per-frame
//! landmarks. Frames without a detection are dropped before the landmarks
//! are handed to the comparison engine.

pub mod client;
pub mod error;
pub mod types;

pub use client::{PoseClient, PoseClientConfig};
pub use error::{MlError, MlResult};
pub use types::{PoseExtraction, PoseFrame, PoseRequest, PoseResponse, RawLandmark};
